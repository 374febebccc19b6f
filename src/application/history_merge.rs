//! Classifies fresh records against the store into inserts and history updates.
//!
//! Comparison runs on rayon over `workers` chunks. Each chunk reads the stored
//! snapshot through a shared immutable reference and produces its own partial
//! plan; partial plans are concatenated afterwards.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::catalog::{CatalogRecord, HistoryUpdate, Snapshot};

/// Writes the store needs after a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    pub inserts: Vec<CatalogRecord>,
    pub updates: Vec<HistoryUpdate>,
    /// Known records whose histories did not grow
    pub unchanged: usize,
}

impl MergePlan {
    fn absorb(mut self, other: Self) -> Self {
        self.inserts.extend(other.inserts);
        self.updates.extend(other.updates);
        self.unchanged += other.unchanged;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }
}

/// Appends every snapshot of `incoming` whose hash `history` lacks.
/// Returns whether anything was appended.
pub fn append_new_snapshots<P: Clone>(
    history: &mut Vec<Snapshot<P>>,
    incoming: &[Snapshot<P>],
) -> bool {
    let mut known: HashSet<String> = history.iter().map(|s| s.content_hash.clone()).collect();
    let before = history.len();
    for snapshot in incoming {
        if known.insert(snapshot.content_hash.clone()) {
            history.push(snapshot.clone());
        }
    }
    history.len() > before
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryMergeEngine {
    workers: usize,
}

impl HistoryMergeEngine {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Default worker count: available CPU parallelism
    pub fn with_available_parallelism() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get))
    }

    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Builds the merge plan.
    ///
    /// The first incoming record for a part number wins; later duplicates in
    /// the same batch are dropped. An update carries the new attributes and
    /// the grown histories, and is emitted only when a history grew.
    pub fn plan(
        &self,
        incoming: Vec<CatalogRecord>,
        stored: &HashMap<String, CatalogRecord>,
    ) -> MergePlan {
        let incoming = dedupe_first_wins(incoming);
        if incoming.is_empty() {
            return MergePlan::default();
        }

        let chunk_size = incoming.len().div_ceil(self.workers);
        debug!(
            "🧮 Comparing {} records against {} stored in chunks of {}",
            incoming.len(),
            stored.len(),
            chunk_size
        );

        let plan = incoming
            .par_chunks(chunk_size)
            .map(|chunk| compare_chunk(chunk, stored))
            .reduce(MergePlan::default, MergePlan::absorb);

        info!(
            "🧮 Merge plan: {} inserts, {} updates, {} unchanged",
            plan.inserts.len(),
            plan.updates.len(),
            plan.unchanged
        );
        plan
    }
}

fn dedupe_first_wins(records: Vec<CatalogRecord>) -> Vec<CatalogRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    let before = records.len();
    let unique: Vec<CatalogRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.part_number.clone()))
        .collect();
    if unique.len() < before {
        debug!("🧹 Dropped {} duplicate part numbers from batch", before - unique.len());
    }
    unique
}

fn compare_chunk(chunk: &[CatalogRecord], stored: &HashMap<String, CatalogRecord>) -> MergePlan {
    let mut plan = MergePlan::default();
    for record in chunk {
        let Some(existing) = stored.get(&record.part_number) else {
            plan.inserts.push(record.clone());
            continue;
        };

        let mut pricing = existing.pricing.clone();
        let mut inventory = existing.inventory.clone();
        let pricing_grew = append_new_snapshots(&mut pricing, &record.pricing);
        let inventory_grew = append_new_snapshots(&mut inventory, &record.inventory);

        if pricing_grew || inventory_grew {
            plan.updates.push(HistoryUpdate {
                part_number: record.part_number.clone(),
                attributes: record.attributes.clone(),
                pricing,
                inventory,
            });
        } else {
            plan.unchanged += 1;
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::CaptureDate;
    use crate::test_utils::{part_number, sample_record};
    use proptest::prelude::*;

    fn day(d: u32) -> CaptureDate {
        CaptureDate { year: 2024, month: 6, day: d }
    }

    fn stored(records: Vec<CatalogRecord>) -> HashMap<String, CatalogRecord> {
        records.into_iter().map(|r| (r.part_number.clone(), r)).collect()
    }

    fn apply(plan: MergePlan, db: &mut HashMap<String, CatalogRecord>) {
        for record in plan.inserts {
            db.insert(record.part_number.clone(), record);
        }
        for update in plan.updates {
            let record = db.get_mut(&update.part_number).unwrap();
            record.attributes = update.attributes;
            record.pricing = update.pricing;
            record.inventory = update.inventory;
        }
    }

    fn batch(market: &[(u64, u32, u64)], date: CaptureDate) -> Vec<CatalogRecord> {
        market
            .iter()
            .map(|(index, cents, quantity)| {
                let price = f64::from(*cents) / 1000.0;
                sample_record(&part_number(*index), price, *quantity, date)
            })
            .collect()
    }

    fn market() -> impl Strategy<Value = Vec<(u64, u32, u64)>> {
        prop::collection::vec((0u64..25, 1u32..6, 0u64..4), 0..40)
    }

    #[test]
    fn unknown_part_is_inserted() {
        let incoming = vec![sample_record("A", 0.1, 10, day(1))];
        let plan = HistoryMergeEngine::new(2).plan(incoming, &HashMap::new());
        assert_eq!(plan.inserts.len(), 1);
        assert!(plan.updates.is_empty());
    }

    #[test]
    fn unchanged_data_is_not_rewritten() {
        let db = stored(vec![sample_record("A", 0.1, 10, day(1))]);
        let plan = HistoryMergeEngine::new(2).plan(vec![sample_record("A", 0.1, 10, day(2))], &db);
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn price_change_appends_only_pricing() {
        let db = stored(vec![sample_record("A", 0.1, 10, day(1))]);
        let plan = HistoryMergeEngine::new(2).plan(vec![sample_record("A", 0.2, 10, day(2))], &db);
        assert_eq!(plan.updates.len(), 1);
        let update = &plan.updates[0];
        assert_eq!(update.pricing.len(), 2);
        assert_eq!(update.inventory.len(), 1);
        assert_eq!(update.pricing[0], db["A"].pricing[0]);
        assert_eq!(update.pricing[1].captured_on, day(2));
    }

    #[test]
    fn returning_to_old_value_is_not_appended() {
        let mut a = sample_record("A", 0.1, 10, day(1));
        let later = sample_record("A", 0.2, 10, day(2));
        append_new_snapshots(&mut a.pricing, &later.pricing);
        let db = stored(vec![a]);
        let plan = HistoryMergeEngine::new(1).plan(vec![sample_record("A", 0.1, 10, day(3))], &db);
        assert!(plan.updates.is_empty());
    }

    #[test]
    fn duplicate_part_numbers_first_wins() {
        let plan = HistoryMergeEngine::new(4).plan(
            vec![sample_record("A", 0.1, 10, day(1)), sample_record("A", 0.9, 99, day(1))],
            &HashMap::new(),
        );
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].inventory[0].payload.cut_tape, 10);
    }

    #[test]
    fn chunking_matches_serial_result() {
        let db = stored(
            (0..40)
                .map(|i| sample_record(&format!("P{i}"), 0.1, 10, day(1)))
                .collect(),
        );
        let incoming: Vec<_> = (0..100)
            .map(|i| {
                let price = if i % 3 == 0 { 0.2 } else { 0.1 };
                sample_record(&format!("P{i}"), price, 10, day(2))
            })
            .collect();

        let serial = HistoryMergeEngine::new(1).plan(incoming.clone(), &db);
        let parallel = HistoryMergeEngine::new(7).plan(incoming, &db);

        assert_eq!(serial.inserts.len(), 60);
        assert_eq!(serial.updates.len(), 14);
        assert_eq!(serial, parallel);
    }

    proptest! {
        #[test]
        fn applied_plans_are_idempotent_and_histories_only_grow(
            first in market(),
            second in market(),
            workers in 1usize..6,
        ) {
            let engine = HistoryMergeEngine::new(workers);
            let mut db = HashMap::new();

            apply(engine.plan(batch(&first, day(1)), &db), &mut db);
            // Same market on a later day writes nothing
            let replay = engine.plan(batch(&first, day(2)), &db);
            prop_assert!(replay.is_empty());

            let before = db.clone();
            apply(engine.plan(batch(&second, day(3)), &db), &mut db);
            for (key, old) in &before {
                let now = &db[key];
                prop_assert!(now.pricing.starts_with(&old.pricing));
                prop_assert!(now.inventory.starts_with(&old.inventory));
            }
            prop_assert!(engine.plan(batch(&second, day(4)), &db).is_empty());
        }
    }
}
