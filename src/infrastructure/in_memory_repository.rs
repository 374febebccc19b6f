//! # In-memory catalog repository
//!
//! Keeps records in a `BTreeMap` behind a tokio `RwLock`. Used for dry runs
//! and tests; batch sizes of every `insert_many` call are recorded.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::catalog::{CatalogRecord, HistoryUpdate};
use crate::domain::errors::StoreError;
use crate::domain::repositories::CatalogRepository;

#[derive(Debug, Default)]
pub struct InMemoryCatalogRepository {
    records: RwLock<BTreeMap<String, CatalogRecord>>,
    insert_batches: std::sync::Mutex<Vec<usize>>,
}

impl InMemoryCatalogRepository {
    pub fn with_records(records: impl IntoIterator<Item = CatalogRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.part_number.clone(), r)).collect()),
            insert_batches: std::sync::Mutex::default(),
        }
    }

    /// Sizes of the `insert_many` calls seen so far
    pub fn insert_batches(&self) -> Vec<usize> {
        self.insert_batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn find_by_part_numbers(
        &self,
        part_numbers: &[String],
    ) -> Result<Vec<CatalogRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(part_numbers
            .iter()
            .filter_map(|pn| records.get(pn).cloned())
            .collect())
    }

    async fn insert_many(&self, batch: &[CatalogRecord]) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        if let Some(dup) = batch.iter().find(|r| records.contains_key(&r.part_number)) {
            return Err(StoreError::Database(format!(
                "UNIQUE constraint failed: catalog_records.part_number ({})",
                dup.part_number
            )));
        }
        for record in batch {
            records.insert(record.part_number.clone(), record.clone());
        }
        if let Ok(mut sizes) = self.insert_batches.lock() {
            sizes.push(batch.len());
        }
        Ok(batch.len() as u64)
    }

    async fn update_histories(&self, updates: &[HistoryUpdate]) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let mut written = 0;
        for update in updates {
            if let Some(record) = records.get_mut(&update.part_number) {
                record.attributes = update.attributes.clone();
                record.pricing = update.pricing.clone();
                record.inventory = update.inventory.clone();
                written += 1;
            }
        }
        Ok(written)
    }

    async fn find_record(&self, part_number: &str) -> Result<Option<CatalogRecord>, StoreError> {
        Ok(self.records.read().await.get(part_number).cloned())
    }

    async fn all_records(&self) -> Result<Vec<CatalogRecord>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn all_part_numbers(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.read().await.len() as u64)
    }

    /// Keys are unique in a map
    async fn duplicate_part_numbers(&self) -> Result<Vec<(String, u64)>, StoreError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::CaptureDate;
    use crate::test_utils::sample_record;

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let date = CaptureDate { year: 2024, month: 1, day: 1 };
        let repo = InMemoryCatalogRepository::with_records([sample_record("A", 0.1, 1, date)]);
        let err = repo.insert_many(&[sample_record("A", 0.1, 1, date)]).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_part_numbers_are_skipped() {
        let date = CaptureDate { year: 2024, month: 1, day: 1 };
        let repo = InMemoryCatalogRepository::with_records([sample_record("A", 0.1, 1, date)]);
        let found = repo
            .find_by_part_numbers(&["A".to_string(), "B".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
