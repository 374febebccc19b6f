//! Data access interfaces for the catalog store and the vendor search API
//!
//! Both sides are traits so the pipeline can run against in-memory fakes.

use async_trait::async_trait;

use crate::domain::catalog::{CatalogRecord, HistoryUpdate};
use crate::domain::credential::{AccessToken, VendorCredential};
use crate::domain::errors::{PageError, StoreError, SyncError};
use crate::domain::vendor::{SearchPage, SearchRequest};

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Records whose part number is in `part_numbers`. Unknown numbers are skipped.
    async fn find_by_part_numbers(
        &self,
        part_numbers: &[String],
    ) -> Result<Vec<CatalogRecord>, StoreError>;

    /// Inserts new records, returns the number written
    async fn insert_many(&self, records: &[CatalogRecord]) -> Result<u64, StoreError>;

    /// Replaces history sequences and attributes of existing records
    async fn update_histories(&self, updates: &[HistoryUpdate]) -> Result<u64, StoreError>;

    async fn find_record(&self, part_number: &str) -> Result<Option<CatalogRecord>, StoreError>;

    async fn all_records(&self) -> Result<Vec<CatalogRecord>, StoreError>;

    async fn all_part_numbers(&self) -> Result<Vec<String>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Part numbers stored more than once, with their row counts
    async fn duplicate_part_numbers(&self) -> Result<Vec<(String, u64)>, StoreError>;
}

/// Vendor keyword search, one credential at a time
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// Exchanges client credentials for a bearer token
    async fn exchange_token(&self, credential: &VendorCredential) -> Result<AccessToken, SyncError>;

    /// Fetches one page of search results
    async fn search(
        &self,
        token: &AccessToken,
        request: &SearchRequest,
    ) -> Result<SearchPage, PageError>;
}
