//! Application layer: the sync pipeline and the maintenance tasks around it

pub mod history_merge;
pub mod housekeeping;
pub mod load_balancer;
pub mod normalizer;
pub mod page_fetcher;
pub mod persistence_writer;
pub mod remediation;
pub mod retrieval_engine;
pub mod sync_service;

pub use history_merge::{HistoryMergeEngine, MergePlan};
pub use housekeeping::{DuplicateReport, Housekeeper};
pub use normalizer::Normalizer;
pub use sync_service::{SyncReport, SyncRequest, SyncRunner, SyncService, SyncSettings};
