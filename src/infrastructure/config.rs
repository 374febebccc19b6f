//! Configuration infrastructure
//!
//! JSON configuration file in the platform config directory, organized in
//! sections:
//! 1. `vendor`    - search API endpoints, credentials and the search template
//! 2. `retrieval` - paging, burst pacing, remediation and merge knobs
//! 3. `store`, `server`, `portal`, `schedule`, `logging`
//!
//! Secrets are normally supplied through the environment and override the file.

#![allow(clippy::uninlined_format_args)]
#![allow(missing_docs)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use crate::application::history_merge::HistoryMergeEngine;
use crate::application::remediation::RemediationConfig;
use crate::application::retrieval_engine::RetrievalConfig;
use crate::application::sync_service::SyncSettings;
use crate::domain::credential::VendorCredential;
use crate::domain::vendor::SearchRequest;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub vendor: VendorConfig,
    pub retrieval: RetrievalSettings,
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub portal: PortalConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

/// Vendor search API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    /// OAuth2 client-credentials token endpoint
    pub token_url: String,

    /// Keyword search endpoint
    pub search_url: String,

    /// Response header carrying the remaining request quota
    pub remaining_quota_header: String,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    pub user_agent: String,

    /// Credentials; usually injected from the environment instead
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<VendorCredential>,

    /// Template every page request is derived from
    pub search: SearchRequest,

    /// Requests assumed left when the quota header is missing
    pub fallback_quota_requests: u64,
}

/// Retrieval, remediation and merge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Records per page
    pub page_size: u64,

    /// Maximum pages per burst
    pub burst_limit: usize,

    /// Vendor rate window in milliseconds
    pub burst_reset_ms: u64,

    /// Extra wait after the rate window in milliseconds
    pub safety_margin_ms: u64,

    /// Global in-flight request cap across all credentials
    pub max_in_flight: usize,

    /// Serial remediation attempts per offset
    pub remediation_max_attempts: u32,

    /// Unrecoverable offsets tolerated per slice
    pub remediation_failure_budget: u32,

    /// History merge worker count (0 = available parallelism)
    pub merge_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// sqlx SQLite URL
    pub database_url: String,

    pub max_connections: u32,

    /// Records per insert/update batch
    pub write_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,

    /// Static bearer token for every route; usually injected from the environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Requests per minute across all clients
    pub rate_limit_per_minute: u32,
}

/// Where a report lives in the reporting portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLocator {
    pub document_id: String,
    pub visualization_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Form login endpoint
    pub login_url: String,

    /// Session endpoint answering with the auth token header
    pub session_url: String,

    /// Base of the document API (`{base}/documents/{id}/instances`)
    pub documents_api_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Login attempts before giving up
    pub max_login_attempts: u32,

    pub request_timeout_seconds: u64,

    /// Report name (inventory, sales, fees, billing) -> locator
    pub reports: BTreeMap<String, ReportLocator>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Run a daily sync while serving
    pub enabled: bool,

    /// Hour of day (UTC) the daily sync starts
    pub hour_utc: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Log directory; next to the executable when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Number of log files to keep (older files are deleted at startup)
    pub max_files: u32,

    /// Module-specific level filters (e.g. "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            token_url: defaults::VENDOR_TOKEN_URL.to_string(),
            search_url: defaults::VENDOR_SEARCH_URL.to_string(),
            remaining_quota_header: defaults::REMAINING_QUOTA_HEADER.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            user_agent: format!("competitor-sync/{}", env!("CARGO_PKG_VERSION")),
            credentials: Vec::new(),
            search: SearchRequest::default(),
            fallback_quota_requests: defaults::FALLBACK_QUOTA_REQUESTS,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            page_size: defaults::PAGE_SIZE,
            burst_limit: defaults::BURST_LIMIT,
            burst_reset_ms: defaults::BURST_RESET_MS,
            safety_margin_ms: defaults::SAFETY_MARGIN_MS,
            max_in_flight: defaults::MAX_IN_FLIGHT,
            remediation_max_attempts: defaults::REMEDIATION_MAX_ATTEMPTS,
            remediation_failure_budget: defaults::REMEDIATION_FAILURE_BUDGET,
            merge_workers: 0,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: ConfigManager::default_database_url(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
            write_batch_size: defaults::WRITE_BATCH_SIZE,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: defaults::BIND_ADDRESS.to_string(),
            auth_token: None,
            rate_limit_per_minute: defaults::RATE_LIMIT_PER_MINUTE,
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            session_url: String::new(),
            documents_api_url: String::new(),
            project_id: None,
            username: None,
            password: None,
            max_login_attempts: defaults::PORTAL_MAX_LOGIN_ATTEMPTS,
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            reports: BTreeMap::new(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hour_utc: defaults::SCHEDULE_HOUR_UTC,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            directory: None,
            max_files: defaults::LOG_MAX_FILES,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("tokio".to_string(), "info".to_string());
                filters
            },
        }
    }
}

impl RetrievalSettings {
    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            page_size: self.page_size,
            burst_limit: self.burst_limit,
            burst_reset: Duration::from_millis(self.burst_reset_ms),
            safety_margin: Duration::from_millis(self.safety_margin_ms),
        }
    }

    pub fn remediation_config(&self) -> RemediationConfig {
        RemediationConfig {
            max_attempts: self.remediation_max_attempts,
            failure_budget: self.remediation_failure_budget,
        }
    }
}

/// What the configuration is about to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPurpose {
    Sync,
    Serve,
    Maintenance,
}

impl AppConfig {
    /// Applies environment overrides (secrets, database URL)
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`; blank values are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = get("VENDOR_CREDENTIALS") {
            self.vendor.credentials = VendorCredential::parse_list(&raw)
                .map_err(anyhow::Error::msg)
                .context("VENDOR_CREDENTIALS is malformed")?;
        } else if let (Some(id), Some(secret)) =
            (get("VENDOR_CLIENT_ID"), get("VENDOR_CLIENT_SECRET"))
        {
            self.vendor.credentials = vec![VendorCredential::new(id, secret)];
        }
        if let Some(token) = get("API_AUTH_TOKEN") {
            self.server.auth_token = Some(token);
        }
        if let Some(username) = get("PORTAL_USERNAME") {
            self.portal.username = Some(username);
        }
        if let Some(password) = get("PORTAL_PASSWORD") {
            self.portal.password = Some(password);
        }
        if let Some(project_id) = get("PORTAL_PROJECT_ID") {
            self.portal.project_id = Some(project_id);
        }
        if let Some(url) = get("DATABASE_URL") {
            self.store.database_url = url;
        }
        Ok(())
    }

    pub fn validate(&self, purpose: ConfigPurpose) -> Result<()> {
        if self.retrieval.page_size == 0 {
            anyhow::bail!("retrieval.page_size must be positive");
        }
        if self.retrieval.burst_limit == 0 {
            anyhow::bail!("retrieval.burst_limit must be positive");
        }
        if self.retrieval.max_in_flight == 0 {
            anyhow::bail!("retrieval.max_in_flight must be positive");
        }
        if self.store.write_batch_size == 0 {
            anyhow::bail!("store.write_batch_size must be positive");
        }
        if matches!(purpose, ConfigPurpose::Sync | ConfigPurpose::Serve) {
            if self.vendor.credentials.is_empty() {
                anyhow::bail!("no vendor credentials configured (set VENDOR_CREDENTIALS)");
            }
            check_url("vendor.token_url", &self.vendor.token_url)?;
            check_url("vendor.search_url", &self.vendor.search_url)?;
        }
        if purpose == ConfigPurpose::Serve {
            if self.server.auth_token.as_deref().is_none_or(str::is_empty) {
                anyhow::bail!("server.auth_token is required to serve (set API_AUTH_TOKEN)");
            }
            if self.server.rate_limit_per_minute == 0 {
                anyhow::bail!("server.rate_limit_per_minute must be positive");
            }
            if self.schedule.hour_utc > 23 {
                anyhow::bail!("schedule.hour_utc must be within 0..=23");
            }
            if self.portal.username.is_some() {
                check_url("portal.login_url", &self.portal.login_url)?;
                check_url("portal.session_url", &self.portal.session_url)?;
                check_url("portal.documents_api_url", &self.portal.documents_api_url)?;
            }
        }
        Ok(())
    }

    pub fn sync_settings(&self) -> SyncSettings {
        let merge_workers = if self.retrieval.merge_workers == 0 {
            HistoryMergeEngine::with_available_parallelism().workers()
        } else {
            self.retrieval.merge_workers
        };
        SyncSettings {
            credentials: self.vendor.credentials.clone(),
            search_template: self.vendor.search.clone(),
            retrieval: self.retrieval.retrieval_config(),
            remediation: self.retrieval.remediation_config(),
            max_in_flight: self.retrieval.max_in_flight,
            merge_workers,
            write_batch_size: self.store.write_batch_size,
            fallback_quota_requests: self.vendor.fallback_quota_requests,
        }
    }
}

fn check_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .with_context(|| format!("{field} is not a valid URL: '{value}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("{field} must be an http(s) URL: '{value}'");
    }
    Ok(())
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("competitor-sync");

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join("competitor-sync");

        Ok(data_dir)
    }

    pub fn default_database_url() -> String {
        Self::get_app_data_dir()
            .map(|dir| format!("sqlite:{}", dir.join("database").join("catalog.db").display()))
            .unwrap_or_else(|_| "sqlite:./data/catalog.db".to_string())
    }

    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("competitor_sync_config.json");
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Initialize configuration system on first run
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        if self.config_path.exists() {
            return self.load_config().await;
        }

        info!("🎉 First run detected - initializing default configuration");
        let default_config = AppConfig::default();
        self.save_config(&default_config).await?;
        info!("✅ Initial configuration written to {:?}", self.config_path);
        Ok(default_config)
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration file could not be parsed: {}", parse_error);
                warn!("⚠️  Resetting to default configuration");

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

/// Default configuration values
pub mod defaults {
    pub const VENDOR_TOKEN_URL: &str = "https://api.digikey.com/v1/oauth2/token";
    pub const VENDOR_SEARCH_URL: &str = "https://api.digikey.com/products/v4/search/keyword";
    pub const REMAINING_QUOTA_HEADER: &str = "X-RateLimit-Remaining";

    /// Default request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Requests per credential per day when the vendor does not say
    pub const FALLBACK_QUOTA_REQUESTS: u64 = 1000;

    /// Records per page (vendor maximum)
    pub const PAGE_SIZE: u64 = 50;

    /// Pages per burst
    pub const BURST_LIMIT: usize = 238;

    /// Vendor rate window
    pub const BURST_RESET_MS: u64 = 15_000;

    pub const SAFETY_MARGIN_MS: u64 = 1_000;

    pub const MAX_IN_FLIGHT: usize = 15;

    pub const REMEDIATION_MAX_ATTEMPTS: u32 = 3;

    pub const REMEDIATION_FAILURE_BUDGET: u32 = 4;

    pub const DB_MAX_CONNECTIONS: u32 = 10;

    pub const WRITE_BATCH_SIZE: usize = 500;

    pub const BIND_ADDRESS: &str = "0.0.0.0:3001";

    pub const RATE_LIMIT_PER_MINUTE: u32 = 100;

    pub const PORTAL_MAX_LOGIN_ATTEMPTS: u32 = 3;

    pub const SCHEDULE_HOUR_UTC: u32 = 6;

    pub const LOG_LEVEL: &str = "info";

    pub const LOG_MAX_FILES: u32 = 7;
}
