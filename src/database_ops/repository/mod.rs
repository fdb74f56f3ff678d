//! Persistence seam for the seeding runs.
//!
//! Every mutating call runs inside the transaction opened with `begin`; the
//! driver decides when to commit or roll back.
use anyhow::Result;
use async_trait::async_trait;

use crate::database_ops::pokeapi::{CharacterRecord, MoveRecord};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgRepository;

pub const PLACEHOLDER_TIER_NAME: &str = "Placeholder";
pub const PLACEHOLDER_TIER_DESCRIPTION: &str = "Temporary tier for initial Pokemon data";

/// Result of a single insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Unique constraint hit or an explicit pre-check found the row.
    AlreadyExists,
    /// Any other statement-level database error; the run continues.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Characters,
    Moves,
}

impl Target {
    pub fn table(self) -> &'static str {
        match self {
            Target::Characters => "public.characters",
            Target::Moves => "public.moves",
        }
    }
}

/// One line of the post-run sample printed to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRow {
    pub name: String,
    pub detail: String,
}

#[async_trait]
pub trait Repository: Send {
    async fn begin(&mut self) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
    fn in_transaction(&self) -> bool;

    /// Id of the placeholder tier, created on first use.
    async fn placeholder_tier(&mut self) -> Result<i64>;
    /// Realign the tiers id sequence with `MAX(id)`.
    async fn reset_tier_sequence(&mut self) -> Result<()>;
    /// Remove every row and restart the identity; cascades to dependents.
    async fn truncate_target(&mut self, target: Target) -> Result<()>;

    async fn insert_character(
        &mut self,
        record: &CharacterRecord,
        tier_id: i64,
    ) -> Result<InsertOutcome>;
    async fn find_move(&mut self, move_name: &str) -> Result<Option<String>>;
    async fn insert_move(&mut self, record: &MoveRecord) -> Result<InsertOutcome>;

    async fn sample(&mut self, target: Target, limit: i64) -> Result<Vec<SampleRow>>;

    /// Roll back anything still open and release the connection.
    async fn close(&mut self);
}
