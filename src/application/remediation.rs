//! Recovery of offsets a slice failed to fetch.
//!
//! Phase one re-requests every offset concurrently. Whatever still fails is
//! retried one offset at a time, a bounded number of attempts each. Offsets
//! that exhaust their attempts count against a run-wide failure budget;
//! crossing it aborts the slice.

use std::collections::BTreeSet;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::application::page_fetcher::PageFetcher;
use crate::domain::catalog::CatalogRecord;
use crate::domain::credential::AccessToken;
use crate::domain::errors::SyncError;
use crate::domain::vendor::SearchRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemediationConfig {
    /// Attempts per offset in the serial phase
    pub max_attempts: u32,
    /// Unrecoverable offsets tolerated before giving up
    pub failure_budget: u32,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            failure_budget: 4,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemediationOutcome {
    pub records: Vec<CatalogRecord>,
    pub recovered: Vec<u64>,
    pub abandoned: Vec<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct RemediationEngine {
    config: RemediationConfig,
}

impl RemediationEngine {
    pub const fn new(config: RemediationConfig) -> Self {
        Self { config }
    }

    pub async fn remediate(
        &self,
        fetcher: &PageFetcher,
        token: &AccessToken,
        template: &SearchRequest,
        offsets: &[u64],
    ) -> Result<RemediationOutcome, SyncError> {
        let mut outcome = RemediationOutcome::default();
        if offsets.is_empty() {
            return Ok(outcome);
        }

        // Phase 1: everything at once
        let results = join_all(offsets.iter().map(|o| fetcher.fetch(token, template, *o))).await;
        let mut still_failing = BTreeSet::new();
        for (offset, result) in offsets.iter().zip(results) {
            match result {
                Ok(page) => {
                    outcome.recovered.push(*offset);
                    outcome.records.extend(page.records);
                }
                Err(e) => {
                    warn!(
                        "🔁 [{}] Bulk retry of offset {} failed: {}",
                        token.client_id, offset, e
                    );
                    still_failing.insert(*offset);
                }
            }
        }
        info!(
            "🔧 [{}] Bulk remediation recovered {}/{} offsets",
            token.client_id,
            outcome.recovered.len(),
            offsets.len()
        );

        // Phase 2: one offset at a time
        let mut failures = 0u32;
        for offset in still_failing {
            let mut recovered = false;
            for attempt in 1..=self.config.max_attempts {
                match fetcher.fetch(token, template, offset).await {
                    Ok(page) => {
                        info!(
                            "✅ [{}] Offset {} recovered on attempt {}/{}",
                            token.client_id, offset, attempt, self.config.max_attempts
                        );
                        outcome.recovered.push(offset);
                        outcome.records.extend(page.records);
                        recovered = true;
                        break;
                    }
                    Err(e) => warn!(
                        "🔁 [{}] Offset {} attempt {}/{} failed: {}",
                        token.client_id, offset, attempt, self.config.max_attempts, e
                    ),
                }
            }
            if recovered {
                continue;
            }

            failures += 1;
            if failures > self.config.failure_budget {
                error!(
                    "❌ [{}] Remediation failure budget exhausted ({} offsets)",
                    token.client_id, failures
                );
                return Err(SyncError::RemediationExhausted { failures });
            }
            outcome.abandoned.push(offset);
        }

        outcome.recovered.sort_unstable();
        Ok(outcome)
    }
}
