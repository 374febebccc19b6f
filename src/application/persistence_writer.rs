//! Applies a merge plan to the catalog store in bounded batches

use std::sync::Arc;

use tracing::{error, info};

use crate::application::history_merge::MergePlan;
use crate::domain::errors::SyncError;
use crate::domain::repositories::CatalogRepository;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub inserted: u64,
    pub updated: u64,
}

pub struct PersistenceWriter {
    repository: Arc<dyn CatalogRepository>,
    batch_size: usize,
}

impl PersistenceWriter {
    pub fn new(repository: Arc<dyn CatalogRepository>, batch_size: usize) -> Self {
        Self {
            repository,
            batch_size: batch_size.max(1),
        }
    }

    /// Inserts first, then updates. Stops at the first failing batch.
    pub async fn apply(&self, plan: &MergePlan) -> Result<WriteSummary, SyncError> {
        let mut summary = WriteSummary::default();

        for batch in plan.inserts.chunks(self.batch_size) {
            let written = self.repository.insert_many(batch).await.map_err(|e| {
                error!(
                    "❌ Insert batch of {} failed after {} inserted: {}",
                    batch.len(),
                    summary.inserted,
                    e
                );
                SyncError::Store(format!("insert of {} records failed: {e}", batch.len()))
            })?;
            summary.inserted += written;
        }
        for batch in plan.updates.chunks(self.batch_size) {
            let written = self.repository.update_histories(batch).await.map_err(|e| {
                error!(
                    "❌ Update batch of {} failed after {} updated: {}",
                    batch.len(),
                    summary.updated,
                    e
                );
                SyncError::Store(format!("update of {} records failed: {e}", batch.len()))
            })?;
            summary.updated += written;
        }

        info!(
            "💾 Persisted {} inserts and {} updates",
            summary.inserted, summary.updated
        );
        Ok(summary)
    }
}
