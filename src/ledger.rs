//! Warning ledger
//!
//! Append-only warnings per (user, guild). The sequence number is computed
//! with read-count-then-insert; two moderators warning the same user at the
//! same instant can race into duplicate counts, which the store cannot
//! prevent without transactions (see DESIGN.md).

use std::sync::Arc;

use crate::records::{self, WarningRecord};
use crate::store::{self, RecordStore, StoreError};

#[derive(Clone)]
pub struct WarningLedger {
    store: Arc<dyn RecordStore>,
}

impl WarningLedger {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Record a new warning, assigning the next 1-based count for the pair.
    ///
    /// # Errors
    /// Returns a `StoreError` when the existing warnings cannot be read or
    /// the new record cannot be persisted.
    pub async fn add(
        &self,
        guild_id: u64,
        user_id: u64,
        moderator_id: u64,
        reason: impl Into<String>,
    ) -> Result<WarningRecord, StoreError> {
        let existing = self.list(guild_id, user_id).await?;
        let record = WarningRecord {
            user_id,
            guild_id,
            reason: reason.into(),
            moderator_id,
            count: existing.len() as u32 + 1,
            punishment_level: None,
            created_at: None,
        };
        let stored = self
            .store
            .insert(store::WARNS, records::to_document(&record)?)
            .await?;
        records::from_document(stored)
    }

    /// All warnings for the pair, ordered by count ascending.
    ///
    /// # Errors
    /// Returns a `StoreError` when the collection cannot be read.
    pub async fn list(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Vec<WarningRecord>, StoreError> {
        let filters = store::user_guild_filters(user_id, guild_id);
        let documents = self.store.select(store::WARNS, Some(&filters)).await?;
        let mut warnings = documents
            .into_iter()
            .map(records::from_document::<WarningRecord>)
            .collect::<Result<Vec<_>, _>>()?;
        warnings.sort_by_key(|warning| warning.count);
        Ok(warnings)
    }

    /// Remove every warning for the pair, returning how many were removed.
    /// A user with no warnings is a no-op: nothing is deleted and 0 comes
    /// back.
    ///
    /// # Errors
    /// Returns a `StoreError` when the count or delete fails.
    pub async fn clear(&self, guild_id: u64, user_id: u64) -> Result<u64, StoreError> {
        let filters = store::user_guild_filters(user_id, guild_id);
        let existing = self.store.count(store::WARNS, Some(&filters)).await?;
        if existing == 0 {
            return Ok(0);
        }
        self.store.delete(store::WARNS, &filters).await?;
        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn ledger() -> (Arc<MemoryStore>, WarningLedger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = WarningLedger::new(store.clone());
        (store, ledger)
    }

    #[tokio::test]
    async fn test_sequential_counts_have_no_gaps_or_repeats() {
        let (_, ledger) = ledger();
        for expected in 1..=6u32 {
            let record = ledger.add(10, 20, 30, "reason").await.unwrap();
            assert_eq!(record.count, expected);
        }
        let counts: Vec<u32> = ledger
            .list(10, 20)
            .await
            .unwrap()
            .iter()
            .map(|w| w.count)
            .collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_counts_are_scoped_per_user_and_guild() {
        let (_, ledger) = ledger();
        ledger.add(10, 20, 30, "a").await.unwrap();
        ledger.add(10, 20, 30, "b").await.unwrap();

        // A different user and a different guild both start from 1.
        assert_eq!(ledger.add(10, 99, 30, "c").await.unwrap().count, 1);
        assert_eq!(ledger.add(11, 20, 30, "d").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_new_warnings_carry_no_punishment() {
        let (_, ledger) = ledger();
        let record = ledger.add(10, 20, 30, "reason").await.unwrap();
        assert!(record.punishment_level.is_none());
        assert!(record.created_at.is_some());
    }

    #[tokio::test]
    async fn test_clear_removes_all_and_reports_count() {
        let (store, ledger) = ledger();
        for _ in 0..4 {
            ledger.add(10, 20, 30, "reason").await.unwrap();
        }
        ledger.add(10, 99, 30, "other user").await.unwrap();

        let removed = ledger.clear(10, 20).await.unwrap();
        assert_eq!(removed, 4);
        assert!(ledger.list(10, 20).await.unwrap().is_empty());
        // The other user's warning is untouched.
        assert_eq!(ledger.list(10, 99).await.unwrap().len(), 1);
        assert_eq!(store.delete_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_with_no_warnings_issues_no_delete() {
        let (store, ledger) = ledger();
        let removed = ledger.clear(10, 20).await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.delete_count(), 0);
    }
}
