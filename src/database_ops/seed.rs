//! Sequential fetch → transform → insert loop shared by both seed variants.
use anyhow::{anyhow, Result};
use clap::ValueEnum;
use std::future::Future;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::database_ops::pokeapi::{
    transform_character, transform_move, CharacterRecord, EntitySource, MoveRecord,
};
use crate::database_ops::repository::{InsertOutcome, Repository, SampleRow, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Characters,
    Moves,
}

impl Variant {
    /// PokeAPI resource path segment.
    pub fn resource(self) -> &'static str {
        match self {
            Variant::Characters => "pokemon",
            Variant::Moves => "move",
        }
    }

    pub fn target(self) -> Target {
        match self {
            Variant::Characters => Target::Characters,
            Variant::Moves => Target::Moves,
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Variant::Characters => "Pokemon",
            Variant::Moves => "move",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncMode {
    /// Truncate the target table before inserting.
    Full,
    /// Keep existing rows and skip names already present.
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CommitStrategy {
    /// One transaction for the whole run.
    Single,
    /// Commit each inserted record on its own.
    PerRecord,
}

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub variant: Variant,
    pub start: u32,
    pub end: u32,
    pub mode: SyncMode,
    pub commit: CommitStrategy,
    pub delay: Duration,
    pub sample_limit: i64,
}

impl SeedOptions {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Characters => Self {
                variant,
                start: 1,
                end: 9,
                mode: SyncMode::Full,
                commit: CommitStrategy::Single,
                delay: Duration::ZERO,
                sample_limit: 5,
            },
            Variant::Moves => Self {
                variant,
                start: 1,
                end: 30,
                mode: SyncMode::Incremental,
                commit: CommitStrategy::PerRecord,
                delay: Duration::from_millis(100),
                sample_limit: 5,
            },
        }
    }

    pub fn ids(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }
}

/// Driver progress. Config loading and connecting happen in the CLI, so a
/// run starts out `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Connected,
    LookupReady,
    Looping(u32),
    Committed,
    RolledBack,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub inserted: u32,
    /// Rows that already existed (unique violation or pre-check hit).
    pub skipped: u32,
    /// Fetch misses, transform errors and statement-level insert errors.
    pub failed: u32,
    pub interrupted: bool,
    pub sample: Vec<SampleRow>,
    pub final_state: RunState,
}

impl RunSummary {
    pub fn processed(&self) -> u32 {
        self.inserted + self.skipped + self.failed
    }
}

struct Tracker {
    state: RunState,
}

impl Tracker {
    fn advance(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
    }
}

enum Prepared {
    Character(CharacterRecord),
    Move(MoveRecord),
}

impl Prepared {
    fn name(&self) -> &str {
        match self {
            Prepared::Character(c) => &c.name,
            Prepared::Move(m) => &m.move_name,
        }
    }
}

/// Run one seeding pass over `options.ids()`.
///
/// `repo` must already be connected. `shutdown` resolving (Ctrl+C in the
/// binary) rolls back the open transaction and ends the run early. The
/// repository is closed on every path.
pub async fn run<S, R, F>(
    options: &SeedOptions,
    source: &S,
    repo: &mut R,
    shutdown: F,
) -> Result<RunSummary>
where
    S: EntitySource + ?Sized,
    R: Repository + ?Sized,
    F: Future<Output = ()>,
{
    let mut tracker = Tracker {
        state: RunState::default(),
    };
    let mut summary = RunSummary::default();

    let result = tokio::select! {
        res = drive(options, source, &mut *repo, &mut summary, &mut tracker) => res.map(|_| false),
        _ = shutdown => Ok(true),
    };

    let outcome = match result {
        Ok(false) => Ok(()),
        Ok(true) => {
            warn!("operation cancelled by user; rolling back open transaction");
            summary.interrupted = true;
            if let Err(e) = repo.rollback().await {
                warn!(error = %e, "rollback after interrupt failed");
            }
            tracker.advance(RunState::RolledBack);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "seed run aborted");
            if let Err(rb) = repo.rollback().await {
                warn!(error = %rb, "rollback after failure failed");
            }
            tracker.advance(RunState::RolledBack);
            Err(e)
        }
    };

    if outcome.is_ok() && !summary.interrupted {
        match repo
            .sample(options.variant.target(), options.sample_limit)
            .await
        {
            Ok(rows) => summary.sample = rows,
            Err(e) => warn!(error = %e, "sample query failed"),
        }
    }

    repo.close().await;
    tracker.advance(RunState::Closed);
    summary.final_state = tracker.state;
    outcome.map(|_| summary)
}

async fn drive<S, R>(
    options: &SeedOptions,
    source: &S,
    repo: &mut R,
    summary: &mut RunSummary,
    tracker: &mut Tracker,
) -> Result<()>
where
    S: EntitySource + ?Sized,
    R: Repository + ?Sized,
{
    let variant = options.variant;
    let per_record = options.commit == CommitStrategy::PerRecord;

    repo.begin().await?;
    let tier_id = match variant {
        Variant::Characters => {
            repo.reset_tier_sequence().await?;
            let id = repo.placeholder_tier().await?;
            println!("Using tier ID: {id}");
            Some(id)
        }
        Variant::Moves => None,
    };
    tracker.advance(RunState::LookupReady);

    if options.mode == SyncMode::Full {
        repo.truncate_target(variant.target()).await?;
        println!("Cleared existing {} from database.", variant.target().table());
    }
    if per_record {
        repo.commit().await?;
    }

    for (idx, id) in options.ids().enumerate() {
        tracker.advance(RunState::Looping(id));
        if idx > 0 && !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }
        println!("\nProcessing {} #{id}...", variant.noun());

        let prepared = match prepare(variant, source, id).await {
            Ok(p) => p,
            Err(reason) => {
                summary.failed += 1;
                println!("  Skipping #{id}: {reason}");
                continue;
            }
        };
        describe(&prepared);

        if per_record {
            repo.begin().await?;
        }
        let outcome = store(repo, &prepared, tier_id).await?;
        match &outcome {
            InsertOutcome::Inserted => {
                summary.inserted += 1;
                println!("Successfully inserted {}", prepared.name());
            }
            InsertOutcome::AlreadyExists => {
                summary.skipped += 1;
                println!("{} already exists, skipping...", prepared.name());
            }
            InsertOutcome::Failed(reason) => {
                summary.failed += 1;
                warn!(id, name = prepared.name(), %reason, "insert failed");
                println!("Failed to insert {}: {reason}", prepared.name());
            }
        }
        if per_record {
            if outcome == InsertOutcome::Inserted {
                repo.commit().await?;
            } else {
                repo.rollback().await?;
            }
        }
    }

    if !per_record {
        repo.commit().await?;
    }
    tracker.advance(RunState::Committed);
    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        failed = summary.failed,
        "seed run committed"
    );
    Ok(())
}

async fn prepare<S>(variant: Variant, source: &S, id: u32) -> std::result::Result<Prepared, String>
where
    S: EntitySource + ?Sized,
{
    let Some(entity) = source.fetch(id).await else {
        return Err("not available from the API".into());
    };
    let prepared = match variant {
        Variant::Characters => transform_character(&entity).map(Prepared::Character),
        Variant::Moves => transform_move(&entity).map(Prepared::Move),
    };
    prepared.map_err(|e| {
        warn!(id, error = %e, "transform failed");
        format!("transform failed: {e}")
    })
}

fn describe(prepared: &Prepared) {
    match prepared {
        Prepared::Character(c) => {
            println!("  Name: {}", c.name);
            if let Some(form_id) = c.form_id {
                println!("  Form ID: {form_id}");
            }
            println!(
                "  Stats: hp={} agility={} strength={} defense={}",
                c.status.hp, c.status.agility, c.status.strength, c.status.defense
            );
        }
        Prepared::Move(m) => {
            let show = |v: Option<i64>| v.map_or_else(|| "N/A".to_string(), |n| n.to_string());
            println!("  Name: {}", m.move_name);
            println!("  Power: {}", show(m.move_info.power));
            println!(
                "  Type: {}",
                m.move_info.move_type.as_deref().unwrap_or("N/A")
            );
            println!("  Accuracy: {}", show(m.move_info.accuracy));
            println!("  Effect Chance: {}", show(m.move_info.effect_chance));
        }
    }
}

async fn store<R>(repo: &mut R, prepared: &Prepared, tier_id: Option<i64>) -> Result<InsertOutcome>
where
    R: Repository + ?Sized,
{
    match prepared {
        Prepared::Character(c) => {
            let tier_id = tier_id.ok_or_else(|| anyhow!("placeholder tier not resolved"))?;
            repo.insert_character(c, tier_id).await
        }
        Prepared::Move(m) => {
            if let Some(existing) = repo.find_move(&m.move_name).await? {
                debug!(name = %m.move_name, %existing, "move already present");
                return Ok(InsertOutcome::AlreadyExists);
            }
            repo.insert_move(m).await
        }
    }
}

/// Operator-facing summary, printed after the run.
pub fn print_summary(variant: Variant, summary: &RunSummary) {
    if summary.interrupted {
        println!("\nOperation cancelled by user; uncommitted work was rolled back.");
    }
    println!("\nSummary ({}):", variant.target().table());
    println!("   Successfully inserted: {}", summary.inserted);
    println!("   Already present (skipped): {}", summary.skipped);
    println!("   Failed: {}", summary.failed);
    println!("   Total processed: {}", summary.processed());
    if !summary.sample.is_empty() {
        println!("\nSample rows in database:");
        for row in &summary.sample {
            println!("   • {}: {}", row.name, row.detail);
        }
    }
}
