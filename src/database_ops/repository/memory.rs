//! In-memory `Repository` with snapshot transactions, for driver tests.
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;

use super::{
    InsertOutcome, Repository, SampleRow, Target, PLACEHOLDER_TIER_DESCRIPTION,
    PLACEHOLDER_TIER_NAME,
};
use crate::database_ops::pokeapi::{CharacterRecord, MoveRecord};

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub tiers: Vec<(i64, String, String)>,
    pub tier_seq: i64,
    pub characters: Vec<(i64, CharacterRecord)>,
    pub moves: Vec<(String, MoveRecord)>,
    pub move_seq: i64,
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    pub committed: Tables,
    staged: Option<Tables>,
    /// Names whose insert fails with a statement-level error.
    pub fail_names: HashSet<String>,
    /// Names whose insert fails as if the connection dropped.
    pub fatal_names: HashSet<String>,
    pub commits: usize,
    pub rollbacks: usize,
    pub closed: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn staged(&mut self) -> Result<&mut Tables> {
        self.staged
            .as_mut()
            .ok_or_else(|| anyhow!("no open transaction"))
    }

    pub fn character_names(&self) -> Vec<String> {
        self.committed
            .characters
            .iter()
            .map(|(_, c)| c.name.clone())
            .collect()
    }

    pub fn move_names(&self) -> Vec<String> {
        self.committed
            .moves
            .iter()
            .map(|(_, m)| m.move_name.clone())
            .collect()
    }

    fn check_injected(&self, name: &str) -> Result<Option<InsertOutcome>> {
        if self.fatal_names.contains(name) {
            bail!("connection reset while inserting {name}");
        }
        if self.fail_names.contains(name) {
            return Ok(Some(InsertOutcome::Failed(format!(
                "value too long for {name}"
            ))));
        }
        Ok(None)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn begin(&mut self) -> Result<()> {
        if self.staged.is_some() {
            bail!("transaction already open");
        }
        self.staged = Some(self.committed.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tables) = self.staged.take() {
            self.committed = tables;
            self.commits += 1;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.staged.take().is_some() {
            self.rollbacks += 1;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    async fn placeholder_tier(&mut self) -> Result<i64> {
        let t = self.staged()?;
        if let Some((id, _, _)) = t.tiers.iter().find(|(_, n, _)| n == PLACEHOLDER_TIER_NAME) {
            return Ok(*id);
        }
        t.tier_seq += 1;
        let id = t.tier_seq;
        t.tiers.push((
            id,
            PLACEHOLDER_TIER_NAME.to_string(),
            PLACEHOLDER_TIER_DESCRIPTION.to_string(),
        ));
        Ok(id)
    }

    async fn reset_tier_sequence(&mut self) -> Result<()> {
        let t = self.staged()?;
        t.tier_seq = t.tiers.iter().map(|(id, _, _)| *id).max().unwrap_or(0);
        Ok(())
    }

    async fn truncate_target(&mut self, target: Target) -> Result<()> {
        let t = self.staged()?;
        match target {
            Target::Characters => t.characters.clear(),
            Target::Moves => {
                t.moves.clear();
                t.move_seq = 0;
            }
        }
        Ok(())
    }

    async fn insert_character(
        &mut self,
        record: &CharacterRecord,
        tier_id: i64,
    ) -> Result<InsertOutcome> {
        if let Some(outcome) = self.check_injected(&record.name)? {
            return Ok(outcome);
        }
        let t = self.staged()?;
        if t.characters.iter().any(|(_, c)| c.name == record.name) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        t.characters.push((tier_id, record.clone()));
        Ok(InsertOutcome::Inserted)
    }

    async fn find_move(&mut self, move_name: &str) -> Result<Option<String>> {
        let t = self.staged()?;
        Ok(t.moves
            .iter()
            .find(|(_, m)| m.move_name == move_name)
            .map(|(id, _)| id.clone()))
    }

    async fn insert_move(&mut self, record: &MoveRecord) -> Result<InsertOutcome> {
        if let Some(outcome) = self.check_injected(&record.move_name)? {
            return Ok(outcome);
        }
        let t = self.staged()?;
        if t.moves.iter().any(|(_, m)| m.move_name == record.move_name) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        t.move_seq += 1;
        let id = t.move_seq.to_string();
        t.moves.push((id, record.clone()));
        Ok(InsertOutcome::Inserted)
    }

    async fn sample(&mut self, target: Target, limit: i64) -> Result<Vec<SampleRow>> {
        let tables = self.staged.as_ref().unwrap_or(&self.committed);
        let limit = usize::try_from(limit).unwrap_or(0);
        let rows = match target {
            Target::Characters => tables
                .characters
                .iter()
                .take(limit)
                .map(|(_, c)| SampleRow {
                    name: c.name.clone(),
                    detail: serde_json::to_string(&c.status).unwrap_or_default(),
                })
                .collect(),
            Target::Moves => tables
                .moves
                .iter()
                .take(limit)
                .map(|(_, m)| SampleRow {
                    name: m.move_name.clone(),
                    detail: format!(
                        "{} power, {} type",
                        m.move_info
                            .power
                            .map_or_else(|| "N/A".to_string(), |p| p.to_string()),
                        m.move_info.move_type.as_deref().unwrap_or("N/A")
                    ),
                })
                .collect(),
        };
        Ok(rows)
    }

    async fn close(&mut self) {
        let _ = self.rollback().await;
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::pokeapi::CharacterStatus;

    fn character(name: &str) -> CharacterRecord {
        CharacterRecord {
            name: name.into(),
            form_id: Some(1),
            status: CharacterStatus {
                hp: 1,
                agility: 1,
                strength: 1,
                defense: 1,
            },
        }
    }

    #[tokio::test]
    async fn placeholder_tier_is_idempotent() {
        let mut repo = MemoryRepository::new();
        repo.begin().await.unwrap();
        let a = repo.placeholder_tier().await.unwrap();
        let b = repo.placeholder_tier().await.unwrap();
        repo.commit().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(repo.committed.tiers.len(), 1);
    }

    #[tokio::test]
    async fn tier_sequence_reset_follows_max_id() {
        let mut repo = MemoryRepository::new();
        repo.begin().await.unwrap();
        repo.reset_tier_sequence().await.unwrap();
        assert_eq!(repo.placeholder_tier().await.unwrap(), 1);
        repo.rollback().await.unwrap();

        repo.begin().await.unwrap();
        // Row written with an explicit id; the counter still points at 0.
        repo.staged()
            .unwrap()
            .tiers
            .push((7, "Legacy".into(), String::new()));
        repo.reset_tier_sequence().await.unwrap();
        assert_eq!(repo.placeholder_tier().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn rollback_discards_staged_rows() {
        let mut repo = MemoryRepository::new();
        repo.begin().await.unwrap();
        repo.insert_character(&character("Bulbasaur"), 1).await.unwrap();
        repo.rollback().await.unwrap();
        assert!(repo.character_names().is_empty());
        assert!(repo.insert_character(&character("Bulbasaur"), 1).await.is_err());
    }
}
