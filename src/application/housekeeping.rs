//! Manual store maintenance.
//!
//! Finds history entries that share a capture date with an earlier entry of
//! the same sequence. Pruning keeps the first entry per date. This is the only
//! path that ever removes history entries and it only runs on request.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::catalog::{CatalogRecord, HistoryUpdate, Snapshot};
use crate::domain::errors::SyncError;
use crate::domain::repositories::CatalogRepository;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateReport {
    pub records_scanned: usize,
    /// Part numbers with at least one same-day duplicate
    pub affected_parts: Vec<String>,
    pub pricing_duplicates: usize,
    pub inventory_duplicates: usize,
    /// Records rewritten (only when applied)
    pub pruned_records: u64,
}

/// Drops every entry whose capture date was already seen earlier in the sequence
fn prune_same_day<P: Clone>(history: &[Snapshot<P>]) -> Vec<Snapshot<P>> {
    let mut seen = HashSet::new();
    history
        .iter()
        .filter(|s| seen.insert(s.captured_on))
        .cloned()
        .collect()
}

fn pruned(record: &CatalogRecord) -> Option<(HistoryUpdate, usize, usize)> {
    let pricing = prune_same_day(&record.pricing);
    let inventory = prune_same_day(&record.inventory);
    let pricing_dups = record.pricing.len() - pricing.len();
    let inventory_dups = record.inventory.len() - inventory.len();
    (pricing_dups + inventory_dups > 0).then(|| {
        (
            HistoryUpdate {
                part_number: record.part_number.clone(),
                attributes: record.attributes.clone(),
                pricing,
                inventory,
            },
            pricing_dups,
            inventory_dups,
        )
    })
}

pub struct Housekeeper {
    repository: Arc<dyn CatalogRepository>,
}

impl Housekeeper {
    pub fn new(repository: Arc<dyn CatalogRepository>) -> Self {
        Self { repository }
    }

    /// Reports same-day duplicates; rewrites the affected records when `apply` is set
    pub async fn same_day_duplicates(&self, apply: bool) -> Result<DuplicateReport, SyncError> {
        let records = self.repository.all_records().await?;
        let mut report = DuplicateReport {
            records_scanned: records.len(),
            ..DuplicateReport::default()
        };

        let mut updates = Vec::new();
        for record in &records {
            if let Some((update, pricing_dups, inventory_dups)) = pruned(record) {
                report.affected_parts.push(record.part_number.clone());
                report.pricing_duplicates += pricing_dups;
                report.inventory_duplicates += inventory_dups;
                updates.push(update);
            }
        }

        if updates.is_empty() {
            info!("🧹 No same-day duplicates in {} records", report.records_scanned);
            return Ok(report);
        }
        warn!(
            "🧹 {} records carry same-day duplicates ({} pricing, {} inventory)",
            report.affected_parts.len(),
            report.pricing_duplicates,
            report.inventory_duplicates
        );

        if apply {
            report.pruned_records = self.repository.update_histories(&updates).await?;
            info!("🧹 Pruned {} records", report.pruned_records);
        }
        Ok(report)
    }
}
