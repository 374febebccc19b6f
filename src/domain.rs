//! Domain module - catalog entities, vendor wire types and access traits
//!
//! Each module is its own file in the domain/ directory.

pub mod catalog;
pub mod credential;
pub mod errors;
pub mod pagination;
pub mod repositories;
pub mod vendor;

pub use catalog::{
    CaptureDate, CatalogRecord, HistoryUpdate, InventorySnapshot, PackagePricing,
    PackageQuantities, PackageType, PartAttributes, PriceBreak, PriceSnapshot, Snapshot,
};
pub use credential::{AccessToken, CredentialBudget, VendorCredential};
pub use errors::{PageError, PortalError, StoreError, SyncError};
pub use pagination::{MarkerState, OffsetMarkerTable, PageRange};
pub use repositories::{CatalogRepository, SearchTransport};
pub use vendor::{SearchPage, SearchRequest, SearchResponse, VendorProduct};
