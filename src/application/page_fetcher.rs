//! # Page Fetcher
//!
//! Fetches and normalizes one search page under the run-wide in-flight cap.
//! Shared by the retrieval engine and remediation.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::application::normalizer::Normalizer;
use crate::domain::catalog::CatalogRecord;
use crate::domain::credential::AccessToken;
use crate::domain::errors::PageError;
use crate::domain::repositories::SearchTransport;
use crate::domain::vendor::SearchRequest;

/// Bounds the number of vendor requests in flight across every slice of a run
#[derive(Debug, Clone)]
pub struct InFlightLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl InFlightLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A fetched page, already mapped to catalog records
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub offset: u64,
    pub total_count: u64,
    pub records: Vec<CatalogRecord>,
}

#[derive(Clone)]
pub struct PageFetcher {
    transport: Arc<dyn SearchTransport>,
    limiter: InFlightLimiter,
    normalizer: Normalizer,
}

impl PageFetcher {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        limiter: InFlightLimiter,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            transport,
            limiter,
            normalizer,
        }
    }

    /// Fetches the page at `offset`. A page only counts as fetched once every
    /// product on it normalized cleanly.
    pub async fn fetch(
        &self,
        token: &AccessToken,
        template: &SearchRequest,
        offset: u64,
    ) -> Result<FetchedPage, PageError> {
        let request = template.at_offset(offset);
        let page = {
            let _permit = self
                .limiter
                .semaphore
                .acquire()
                .await
                .map_err(|e| PageError::Transport(format!("in-flight limiter closed: {e}")))?;
            self.transport.search(token, &request).await
        };

        let page = match page {
            Ok(page) => page,
            Err(e) => {
                if e.is_rate_limited() {
                    warn!("🚦 Rate limited at offset {} ({})", offset, token.client_id);
                }
                return Err(e);
            }
        };

        let records = page
            .products
            .iter()
            .map(|p| {
                self.normalizer.normalize(p).map_err(|e| {
                    PageError::Malformed(format!(
                        "product {} could not be normalized: {e}",
                        p.manufacturer_product_number
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("📄 Offset {} -> {} records", offset, records.len());
        Ok(FetchedPage {
            offset,
            total_count: page.total_count,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_capacity_is_at_least_one() {
        assert_eq!(InFlightLimiter::new(0).capacity(), 1);
        let limiter = InFlightLimiter::new(15);
        assert_eq!(limiter.capacity(), 15);
        assert_eq!(limiter.available(), 15);
    }
}
