//! Error taxonomy for the sync pipeline
//!
//! Page-level failures are absorbed and retried inside the retrieval engine;
//! structural failures abort the run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A transient failure of a single page fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageError {
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed page body: {0}")]
    Malformed(String),
}

impl PageError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Rate-limit rejections are worth calling out separately in logs
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Http { status: 429, .. })
    }
}

/// Store access failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Stored document could not be decoded for {part_number}: {reason}")]
    Decode { part_number: String, reason: String },

    #[error("Document could not be encoded for {part_number}: {reason}")]
    Encode { part_number: String, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Structural failure that aborts a whole sync run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("No usable vendor credentials remain after probing")]
    NoActiveCredentials,

    #[error("Total record count unavailable: {0}")]
    CountUnavailable(String),

    #[error("Remediation gave up after {failures} unrecoverable pages")]
    RemediationExhausted { failures: u32 },

    #[error("Credential quota cannot cover the range: {uncovered} records left unassigned")]
    InsufficientQuota { uncovered: u64 },

    #[error("Slice for credential {credential} failed: {reason}")]
    SliceFailed { credential: String, reason: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("A sync run is already in progress")]
    AlreadyRunning,
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        Self::Store(e.to_string())
    }
}

/// Reporting portal collaborator failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortalError {
    #[error("Portal session expired")]
    SessionExpired,

    #[error("Portal login failed: {0}")]
    Login(String),

    #[error("Portal HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Portal transport error: {0}")]
    Transport(String),

    #[error("Unknown report document: {0}")]
    UnknownDocument(String),

    #[error("Report document not configured: {0}")]
    NotConfigured(String),
}
