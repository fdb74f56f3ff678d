//! Live Postgres checks. Skipped unless `POKESEED_TEST_DATABASE_URL` points at
//! a scratch database; the tables in `sql/schema.sql` are truncated.
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;

use pokeseed::database_ops::pokeapi::{
    CharacterRecord, CharacterStatus, EntitySource, MoveInfo, MoveRecord,
};
use pokeseed::database_ops::repository::{InsertOutcome, PgRepository, Repository, Target};
use pokeseed::database_ops::seed::{self, SeedOptions, Variant};
use pokeseed::util::db::Db;

// The tests share one database.
static DB_LOCK: Mutex<()> = Mutex::const_new(());

async fn fresh_repo() -> Option<PgRepository> {
    let url = std::env::var("POKESEED_TEST_DATABASE_URL").ok()?;
    let db = Db::connect_url(&url).await.expect("connect test database");
    sqlx::raw_sql(include_str!("../sql/schema.sql"))
        .execute(&db.pool)
        .await
        .expect("apply schema");
    sqlx::raw_sql(
        "TRUNCATE TABLE public.characters, public.moves RESTART IDENTITY CASCADE; \
         DELETE FROM public.tiers;",
    )
    .execute(&db.pool)
    .await
    .expect("reset tables");
    Some(PgRepository::new(db))
}

fn character(name: &str) -> CharacterRecord {
    CharacterRecord {
        name: name.into(),
        form_id: Some(1),
        status: CharacterStatus {
            hp: 45,
            agility: 45,
            strength: 57,
            defense: 57,
        },
    }
}

fn tackle() -> MoveRecord {
    MoveRecord {
        move_name: "Tackle".into(),
        move_info: MoveInfo {
            power: Some(40),
            accuracy: Some(100),
            effect_chance: None,
            move_type: Some("normal".into()),
            effect: Some("Inflicts regular damage.".into()),
        },
    }
}

async fn count(url: &str, sql: &str) -> i64 {
    let db = Db::connect_url(url).await.unwrap();
    let n: i64 = sqlx::query_scalar(sql).fetch_one(&db.pool).await.unwrap();
    db.close().await;
    n
}

#[tokio::test]
async fn placeholder_tier_is_created_once() {
    let _guard = DB_LOCK.lock().await;
    let Some(mut repo) = fresh_repo().await else {
        eprintln!("POKESEED_TEST_DATABASE_URL not set; skipping");
        return;
    };
    repo.begin().await.unwrap();
    repo.reset_tier_sequence().await.unwrap();
    let first = repo.placeholder_tier().await.unwrap();
    let second = repo.placeholder_tier().await.unwrap();
    repo.commit().await.unwrap();
    repo.close().await;
    assert_eq!(first, second);

    let url = std::env::var("POKESEED_TEST_DATABASE_URL").unwrap();
    assert_eq!(
        count(&url, "SELECT COUNT(*) FROM public.tiers WHERE name = 'Placeholder'").await,
        1
    );
}

#[tokio::test]
async fn tier_sequence_reset_follows_max_id() {
    let _guard = DB_LOCK.lock().await;
    let Some(mut repo) = fresh_repo().await else {
        eprintln!("POKESEED_TEST_DATABASE_URL not set; skipping");
        return;
    };
    // Empty table: the next id is 1 even though earlier tests advanced the sequence.
    repo.begin().await.unwrap();
    repo.reset_tier_sequence().await.unwrap();
    assert_eq!(repo.placeholder_tier().await.unwrap(), 1);
    repo.rollback().await.unwrap();

    let url = std::env::var("POKESEED_TEST_DATABASE_URL").unwrap();
    let side = Db::connect_url(&url).await.unwrap();
    sqlx::raw_sql(
        "DELETE FROM public.tiers;          INSERT INTO public.tiers (id, name) VALUES (7, 'Legacy');",
    )
    .execute(&side.pool)
    .await
    .unwrap();
    side.close().await;

    repo.begin().await.unwrap();
    repo.reset_tier_sequence().await.unwrap();
    assert_eq!(repo.placeholder_tier().await.unwrap(), 8);
    repo.rollback().await.unwrap();
    repo.close().await;
}

#[tokio::test]
async fn duplicate_insert_keeps_transaction_usable() {
    let _guard = DB_LOCK.lock().await;
    let Some(mut repo) = fresh_repo().await else {
        eprintln!("POKESEED_TEST_DATABASE_URL not set; skipping");
        return;
    };
    repo.begin().await.unwrap();
    let tier = repo.placeholder_tier().await.unwrap();
    assert_eq!(
        repo.insert_character(&character("Bulbasaur"), tier).await.unwrap(),
        InsertOutcome::Inserted
    );
    assert_eq!(
        repo.insert_character(&character("Bulbasaur"), tier).await.unwrap(),
        InsertOutcome::AlreadyExists
    );
    // The unique violation must not have aborted the transaction.
    assert_eq!(
        repo.insert_character(&character("Ivysaur"), tier).await.unwrap(),
        InsertOutcome::Inserted
    );
    repo.commit().await.unwrap();

    let sample = repo.sample(Target::Characters, 5).await.unwrap();
    let names: Vec<_> = sample.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Bulbasaur", "Ivysaur"]);
    repo.close().await;
}

#[tokio::test]
async fn find_move_sees_uncommitted_insert() {
    let _guard = DB_LOCK.lock().await;
    let Some(mut repo) = fresh_repo().await else {
        eprintln!("POKESEED_TEST_DATABASE_URL not set; skipping");
        return;
    };
    repo.begin().await.unwrap();
    assert_eq!(repo.find_move("Tackle").await.unwrap(), None);
    assert_eq!(
        repo.insert_move(&tackle()).await.unwrap(),
        InsertOutcome::Inserted
    );
    let id = repo.find_move("Tackle").await.unwrap().expect("move id");
    assert_eq!(id.len(), 36);

    let sample = repo.sample(Target::Moves, 5).await.unwrap();
    assert_eq!(sample[0].detail, "40 power, normal type");
    repo.rollback().await.unwrap();
    repo.close().await;
}

struct FixedSource(HashMap<u32, Value>);

#[async_trait]
impl EntitySource for FixedSource {
    async fn fetch(&self, id: u32) -> Option<Value> {
        self.0.get(&id).cloned()
    }
}

fn pokemon(id: u32, name: &str, hp: u32) -> Value {
    json!({
        "id": id,
        "name": name,
        "stats": [
            {"base_stat": hp, "stat": {"name": "hp"}},
            {"base_stat": 45, "stat": {"name": "speed"}},
            {"base_stat": 49, "stat": {"name": "attack"}},
            {"base_stat": 65, "stat": {"name": "special-attack"}},
            {"base_stat": 49, "stat": {"name": "defense"}},
            {"base_stat": 65, "stat": {"name": "special-defense"}}
        ]
    })
}

#[tokio::test]
async fn full_character_run_replaces_existing_rows() {
    let _guard = DB_LOCK.lock().await;
    let Some(mut repo) = fresh_repo().await else {
        eprintln!("POKESEED_TEST_DATABASE_URL not set; skipping");
        return;
    };
    repo.begin().await.unwrap();
    let tier = repo.placeholder_tier().await.unwrap();
    repo.insert_character(&character("Stale"), tier).await.unwrap();
    repo.commit().await.unwrap();

    let source = FixedSource(HashMap::from([
        (1, pokemon(1, "bulbasaur", 45)),
        (2, pokemon(2, "ivysaur", 60)),
    ]));
    let options = SeedOptions {
        end: 3,
        ..SeedOptions::for_variant(Variant::Characters)
    };
    let summary = seed::run(&options, &source, &mut repo, std::future::pending())
        .await
        .unwrap();
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.failed, 1);

    let url = std::env::var("POKESEED_TEST_DATABASE_URL").unwrap();
    assert_eq!(count(&url, "SELECT COUNT(*) FROM public.characters").await, 2);
    assert_eq!(
        count(&url, "SELECT COUNT(*) FROM public.characters WHERE name = 'Stale'").await,
        0
    );
}
