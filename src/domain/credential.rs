//! Vendor API credentials and their per-run budgets

use serde::{Deserialize, Serialize};

/// Client id/secret pair registered with the vendor
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorCredential {
    pub client_id: String,
    pub client_secret: String,
}

impl VendorCredential {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Parses `id:secret,id:secret`. Blank entries are skipped.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, String> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .split_once(':')
                    .filter(|(id, secret)| !id.is_empty() && !secret.is_empty())
                    .map(|(id, secret)| Self::new(id.trim(), secret.trim()))
                    .ok_or_else(|| format!("credential entry '{entry}' is not id:secret"))
            })
            .collect()
    }
}

impl std::fmt::Debug for VendorCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorCredential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// Bearer token bound to the client id that obtained it
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub client_id: String,
    token: String,
}

impl AccessToken {
    pub fn new(client_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            token: token.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Credential state after probing, used to plan the work split
#[derive(Debug, Clone)]
pub struct CredentialBudget {
    pub credential: VendorCredential,
    pub access_token: Option<AccessToken>,
    /// Records this credential may still retrieve (remaining requests x page size)
    pub remaining_quota: u64,
    pub is_active: bool,
    /// Total match count seen by the probe request
    pub observed_total: Option<u64>,
}

impl CredentialBudget {
    pub fn inactive(credential: VendorCredential) -> Self {
        Self {
            credential,
            access_token: None,
            remaining_quota: 0,
            is_active: false,
            observed_total: None,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.credential.client_id
    }
}
