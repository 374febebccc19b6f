//! reqwest-backed vendor search API client
//!
//! Token exchange uses the OAuth2 client-credentials grant. Search requests
//! carry the bearer token plus the client id header; the remaining request
//! quota is read from a response header when the vendor sends it.

#![allow(clippy::uninlined_format_args)]

use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::credential::{AccessToken, VendorCredential};
use crate::domain::errors::{PageError, SyncError};
use crate::domain::repositories::SearchTransport;
use crate::domain::vendor::{SearchPage, SearchRequest, SearchResponse};
use crate::infrastructure::config::VendorConfig;

pub const CLIENT_ID_HEADER: &str = "X-DIGIKEY-Client-Id";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Clone)]
pub struct VendorApiClient {
    client: Client,
    token_url: String,
    search_url: String,
    quota_header: String,
}

impl VendorApiClient {
    pub fn new(config: &VendorConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            token_url: config.token_url.clone(),
            search_url: config.search_url.clone(),
            quota_header: config.remaining_quota_header.clone(),
        })
    }

    fn remaining_requests(&self, response: &reqwest::Response) -> Option<u64> {
        response
            .headers()
            .get(self.quota_header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

fn status_message(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown status").to_string()
}

#[async_trait]
impl SearchTransport for VendorApiClient {
    async fn exchange_token(
        &self,
        credential: &VendorCredential,
    ) -> Result<AccessToken, SyncError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credential.client_id.as_str()),
                ("client_secret", credential.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Authentication(format!("{}: {}", credential.client_id, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("🔒 Token exchange for {} rejected with {}", credential.client_id, status);
            return Err(SyncError::Authentication(format!(
                "{}: HTTP {} {}",
                credential.client_id,
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| {
                SyncError::Authentication(format!(
                    "{}: malformed token response: {}",
                    credential.client_id, e
                ))
            })?;
        debug!(
            "🔑 Token issued for {} (expires in {:?}s)",
            credential.client_id, token.expires_in
        );
        Ok(AccessToken::new(&credential.client_id, token.access_token))
    }

    async fn search(
        &self,
        token: &AccessToken,
        request: &SearchRequest,
    ) -> Result<SearchPage, PageError> {
        let response = self
            .client
            .post(&self.search_url)
            .bearer_auth(token.secret())
            .header(CLIENT_ID_HEADER, &token.client_id)
            .json(request)
            .send()
            .await
            .map_err(|e| PageError::Transport(e.to_string()))?;

        let status = response.status();
        let remaining_requests = self.remaining_requests(&response);
        if !status.is_success() {
            return Err(PageError::http(status.as_u16(), status_message(status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PageError::Transport(e.to_string()))?;
        let parsed: SearchResponse =
            serde_json::from_slice(&body).map_err(|e| PageError::Malformed(e.to_string()))?;

        Ok(SearchPage {
            total_count: parsed.products_count,
            products: parsed.products,
            remaining_requests,
        })
    }
}
