//! Burst-paced retrieval of one credential's slice.
//!
//! Offsets are fetched burst by burst, every page of a burst concurrently
//! under the shared in-flight limiter. Between bursts the engine waits out the
//! vendor's rate window. Failed offsets are handed to remediation once the
//! last burst settles.

use std::time::Duration;

use futures::future::join_all;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::application::page_fetcher::PageFetcher;
use crate::application::remediation::{RemediationEngine, RemediationOutcome};
use crate::domain::catalog::CatalogRecord;
use crate::domain::credential::AccessToken;
use crate::domain::errors::SyncError;
use crate::domain::pagination::{OffsetMarkerTable, PageRange};
use crate::domain::vendor::SearchRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalConfig {
    pub page_size: u64,
    /// Upper bound on pages per burst
    pub burst_limit: usize,
    /// Vendor rate window length
    pub burst_reset: Duration,
    /// Extra wait added on top of `burst_reset`
    pub safety_margin: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            burst_limit: 238,
            burst_reset: Duration::from_millis(15_000),
            safety_margin: Duration::from_millis(1_000),
        }
    }
}

/// Everything one slice produced
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub records: Vec<CatalogRecord>,
    pub markers: OffsetMarkerTable,
    pub bursts: u64,
    /// Offsets recovered by remediation
    pub remediated: Vec<u64>,
    /// Offsets remediation could not recover (within its failure budget)
    pub abandoned: Vec<u64>,
}

pub struct RetrievalEngine {
    fetcher: PageFetcher,
    remediation: RemediationEngine,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        fetcher: PageFetcher,
        remediation: RemediationEngine,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            fetcher,
            remediation,
            config,
        }
    }

    /// Retrieves `[template.offset, total)` with `token`.
    ///
    /// Page failures never abort; only remediation exhaustion does.
    pub async fn retrieve(
        &self,
        token: &AccessToken,
        template: &SearchRequest,
        total: u64,
    ) -> Result<RetrievalOutcome, SyncError> {
        let range = PageRange::new(template.offset, total, self.config.page_size)
            .ok_or_else(|| SyncError::Configuration("page size must be positive".into()))?;
        let burst_count = range.burst_count(self.config.burst_limit);

        info!(
            "🚀 [{}] Retrieving offsets {}..{} ({} pages in {} bursts)",
            token.client_id,
            range.start(),
            range.total(),
            range.pending_pages(),
            burst_count
        );

        let mut outcome = RetrievalOutcome {
            bursts: burst_count,
            ..RetrievalOutcome::default()
        };

        for (index, burst) in range.bursts(self.config.burst_limit).enumerate() {
            let started = Instant::now();
            for offset in &burst {
                outcome.markers.schedule(*offset);
            }

            let results = join_all(
                burst
                    .iter()
                    .map(|offset| self.fetcher.fetch(token, template, *offset)),
            )
            .await;

            let mut failed = 0usize;
            for (offset, result) in burst.iter().zip(results) {
                match result {
                    Ok(page) => {
                        outcome.markers.succeed(*offset);
                        outcome.records.extend(page.records);
                    }
                    Err(e) => {
                        failed += 1;
                        outcome.markers.fail(*offset);
                        warn!("⚠️ [{}] Offset {} failed: {}", token.client_id, offset, e);
                    }
                }
            }
            debug!(
                "📦 [{}] Burst {}/{} settled: {} pages, {} failed",
                token.client_id,
                index + 1,
                burst_count,
                burst.len(),
                failed
            );

            if (index as u64) + 1 < burst_count {
                self.cool_down(started).await;
            }
        }

        if outcome.markers.has_failures() {
            let redo = outcome.markers.missing_or_failed(&range);
            info!(
                "🔧 [{}] Handing {} offsets to remediation",
                token.client_id,
                redo.len()
            );
            let RemediationOutcome {
                records,
                recovered,
                abandoned,
            } = self.remediation.remediate(&self.fetcher, token, template, &redo).await?;
            for offset in &recovered {
                outcome.markers.succeed(*offset);
            }
            outcome.records.extend(records);
            outcome.remediated = recovered;
            outcome.abandoned = abandoned;
        }

        info!(
            "✅ [{}] Slice complete: {} records, {} remediated, {} abandoned",
            token.client_id,
            outcome.records.len(),
            outcome.remediated.len(),
            outcome.abandoned.len()
        );
        Ok(outcome)
    }

    /// Waits out the rate window unless the burst itself already outlasted it
    async fn cool_down(&self, burst_started: Instant) {
        let elapsed = burst_started.elapsed();
        if elapsed >= self.config.burst_reset {
            debug!("⏭️ Burst took {:?}, window already reset", elapsed);
            return;
        }
        let wait = self.config.burst_reset + self.config.safety_margin;
        debug!("⏳ Cooling down {:?} before next burst", wait);
        sleep(wait).await;
    }
}
