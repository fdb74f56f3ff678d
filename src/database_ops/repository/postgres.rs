use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use sqlx::postgres::PgQueryResult;
use sqlx::types::Json;
use sqlx::{Executor, PgConnection, Postgres, Row, Transaction};
use tracing::{debug, instrument, warn};

use super::{
    InsertOutcome, Repository, SampleRow, Target, PLACEHOLDER_TIER_DESCRIPTION,
    PLACEHOLDER_TIER_NAME,
};
use crate::database_ops::pokeapi::{CharacterRecord, MoveRecord};
use crate::util::db::Db;

const INSERT_SAVEPOINT: &str = "pokeseed_insert";

/// sqlx-backed repository holding at most one open transaction.
pub struct PgRepository {
    db: Db,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgRepository {
    pub fn new(db: Db) -> Self {
        Self { db, tx: None }
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| anyhow!("no open transaction"))
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    // 23505 = unique_violation
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

/// Statement-level failures become an outcome; anything that means the
/// connection itself is gone propagates.
fn classify_insert_error(e: sqlx::Error) -> Result<InsertOutcome> {
    if is_unique_violation(&e) {
        return Ok(InsertOutcome::AlreadyExists);
    }
    match e {
        sqlx::Error::Database(db_err) => Ok(InsertOutcome::Failed(db_err.message().to_string())),
        other => Err(other.into()),
    }
}

/// Release or roll back the per-insert savepoint so a failed statement never
/// aborts the surrounding transaction.
async fn finish_insert(
    conn: &mut PgConnection,
    res: std::result::Result<PgQueryResult, sqlx::Error>,
) -> Result<InsertOutcome> {
    match res {
        Ok(_) => {
            (&mut *conn).execute(sqlx::raw_sql(&format!("RELEASE SAVEPOINT {INSERT_SAVEPOINT}")))
                .await?;
            Ok(InsertOutcome::Inserted)
        }
        Err(e) => {
            let outcome = classify_insert_error(e)?;
            (&mut *conn).execute(sqlx::raw_sql(&format!("ROLLBACK TO SAVEPOINT {INSERT_SAVEPOINT}")))
                .await?;
            Ok(outcome)
        }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            bail!("transaction already open");
        }
        self.tx = Some(self.db.pool.begin().await?);
        debug!("transaction opened");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!("transaction committed");
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!("transaction rolled back");
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    #[instrument(skip(self))]
    async fn placeholder_tier(&mut self) -> Result<i64> {
        let conn = self.conn()?;
        if let Some(rec) = sqlx::query("SELECT id::bigint AS id FROM public.tiers WHERE name = $1")
            .persistent(false)
            .bind(PLACEHOLDER_TIER_NAME)
            .fetch_optional(&mut *conn)
            .await?
        {
            return Ok(rec.get::<i64, _>("id"));
        }
        let rec = sqlx::query(
            "INSERT INTO public.tiers (name, description) VALUES ($1, $2) RETURNING id::bigint AS id",
        )
        .persistent(false)
        .bind(PLACEHOLDER_TIER_NAME)
        .bind(PLACEHOLDER_TIER_DESCRIPTION)
        .fetch_one(&mut *conn)
        .await?;
        Ok(rec.get("id"))
    }

    async fn reset_tier_sequence(&mut self) -> Result<()> {
        let conn = self.conn()?;
        // is_called=false with MAX+1 keeps an empty table valid (setval(…, 0) would be out of range).
        sqlx::query(
            "SELECT setval(pg_get_serial_sequence('public.tiers','id'), (SELECT COALESCE(MAX(id),0)+1 FROM public.tiers), false)",
        )
        .persistent(false)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn truncate_target(&mut self, target: Target) -> Result<()> {
        let conn = self.conn()?;
        let stmt = format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", target.table());
        (&mut *conn).execute(sqlx::raw_sql(&stmt)).await?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(name = %record.name))]
    async fn insert_character(
        &mut self,
        record: &CharacterRecord,
        tier_id: i64,
    ) -> Result<InsertOutcome> {
        let conn = self.conn()?;
        (&mut *conn).execute(sqlx::raw_sql(&format!("SAVEPOINT {INSERT_SAVEPOINT}")))
            .await?;
        let res = sqlx::query(
            "INSERT INTO public.characters (tier_id, form_id, name, status) VALUES ($1, $2, $3, $4)",
        )
        .persistent(false)
        .bind(tier_id)
        .bind(record.form_id)
        .bind(&record.name)
        .bind(Json(&record.status))
        .execute(&mut *conn)
        .await;
        finish_insert(conn, res).await
    }

    async fn find_move(&mut self, move_name: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let id: Option<String> =
            sqlx::query_scalar("SELECT id::text FROM public.moves WHERE move_name = $1")
                .persistent(false)
                .bind(move_name)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(id)
    }

    #[instrument(skip(self, record), fields(name = %record.move_name))]
    async fn insert_move(&mut self, record: &MoveRecord) -> Result<InsertOutcome> {
        let conn = self.conn()?;
        (&mut *conn).execute(sqlx::raw_sql(&format!("SAVEPOINT {INSERT_SAVEPOINT}")))
            .await?;
        let res = sqlx::query("INSERT INTO public.moves (move_name, move_info) VALUES ($1, $2)")
            .persistent(false)
            .bind(&record.move_name)
            .bind(Json(&record.move_info))
            .execute(&mut *conn)
            .await;
        finish_insert(conn, res).await
    }

    async fn sample(&mut self, target: Target, limit: i64) -> Result<Vec<SampleRow>> {
        let sql = match target {
            Target::Characters => {
                "SELECT name AS label, status::text AS a, NULL::text AS b \
                 FROM public.characters ORDER BY name LIMIT $1"
            }
            Target::Moves => {
                "SELECT move_name AS label, move_info->>'power' AS a, move_info->>'type' AS b \
                 FROM public.moves LIMIT $1"
            }
        };
        // With a single pooled connection, reads must reuse an open transaction.
        let rows = match self.tx.as_deref_mut() {
            Some(conn) => {
                sqlx::query(sql)
                    .persistent(false)
                    .bind(limit)
                    .fetch_all(conn)
                    .await?
            }
            None => {
                sqlx::query(sql)
                    .persistent(false)
                    .bind(limit)
                    .fetch_all(&self.db.pool)
                    .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|r| {
                let name: String = r.get("label");
                let a: Option<String> = r.get("a");
                let b: Option<String> = r.get("b");
                let detail = match target {
                    Target::Characters => a.unwrap_or_default(),
                    Target::Moves => format!(
                        "{} power, {} type",
                        a.as_deref().unwrap_or("N/A"),
                        b.as_deref().unwrap_or("N/A")
                    ),
                };
                SampleRow { name, detail }
            })
            .collect())
    }

    async fn close(&mut self) {
        if let Err(e) = self.rollback().await {
            warn!(error = %e, "rollback during close failed");
        }
        self.db.close().await;
    }
}
