//! Infrastructure layer: configuration, logging, storage and external integrations
//!
//! Each module is its own file in the infrastructure/ directory.

pub mod catalog_repository;
pub mod config;
pub mod database_connection;
pub mod http_api;
pub mod in_memory_repository;
pub mod logging;
pub mod portal;
pub mod scheduler;
pub mod vendor_api;

pub use catalog_repository::SqliteCatalogRepository;
pub use config::{AppConfig, ConfigManager, ConfigPurpose};
pub use database_connection::DatabaseConnection;
pub use in_memory_repository::InMemoryCatalogRepository;
pub use logging::{get_log_directory, init_logging_with_config};
pub use vendor_api::VendorApiClient;
