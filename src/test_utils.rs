//! Test utilities for competitor-sync
//!
//! A scripted in-process stand-in for the vendor search API, plus builders
//! for vendor products and catalog records. Integration tests and benches use
//! these through the library crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::application::normalizer::Normalizer;
use crate::domain::catalog::{CaptureDate, CatalogRecord};
use crate::domain::credential::{AccessToken, VendorCredential};
use crate::domain::errors::{PageError, SyncError};
use crate::domain::repositories::SearchTransport;
use crate::domain::vendor::{SearchPage, SearchRequest, VendorProduct};

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Vendor product with one cut-tape price break and quantity
pub fn sample_product(part_number: &str, unit_price: f64, quantity: u64) -> VendorProduct {
    let value = serde_json::json!({
        "ManufacturerProductNumber": part_number,
        "Description": {
            "ProductDescription": format!("RES {part_number}"),
            "DetailedDescription": "Chip resistor"
        },
        "ProductUrl": format!("https://vendor.example/p/{part_number}"),
        "ProductStatus": {"Id": 0, "Status": "Active"},
        "Parameters": [
            {"ParameterId": 2085, "ParameterText": "Resistance", "ValueText": "10 kOhms"},
            {"ParameterId": 3, "ParameterText": "Tolerance", "ValueText": "±1%"}
        ],
        "ProductVariations": [{
            "PackageType": {"Id": 2, "Name": "Cut Tape (CT)"},
            "StandardPricing": [
                {"BreakQuantity": 1, "UnitPrice": unit_price, "TotalPrice": unit_price}
            ],
            "QuantityAvailableforPackageType": quantity
        }],
        "Category": {
            "Name": "Resistors",
            "ChildCategories": [{"Name": "Chip Resistor - Surface Mount"}]
        },
        "Series": {"Name": "RC"}
    });
    // Fields above always match VendorProduct
    serde_json::from_value(value).unwrap_or_else(|e| panic!("sample product is invalid: {e}"))
}

/// Normalized record for `part_number` captured on `date`
pub fn sample_record(
    part_number: &str,
    unit_price: f64,
    quantity: u64,
    date: CaptureDate,
) -> CatalogRecord {
    Normalizer::new(date)
        .normalize(&sample_product(part_number, unit_price, quantity))
        .unwrap_or_else(|e| panic!("sample record is invalid: {e}"))
}

pub fn part_number(index: u64) -> String {
    format!("PN-{index:06}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedCall {
    pub offset: u64,
    pub limit: u64,
    pub at: Instant,
}

struct Catalog {
    size: u64,
    unit_price: f64,
    quantity: u64,
}

/// Scripted vendor search API.
///
/// Serves `PN-000000..` products, one per record index. Failures, rejected
/// credentials, quotas and latency are configured per test.
pub struct ScriptedTransport {
    catalog: Mutex<Catalog>,
    latency: Duration,
    transient_failures: Mutex<HashMap<u64, u32>>,
    permanent_failures: Mutex<HashSet<u64>>,
    rejected_clients: Mutex<HashSet<String>>,
    quotas: Mutex<HashMap<String, u64>>,
    calls: Mutex<HashMap<String, Vec<RecordedCall>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn with_catalog(size: u64) -> Self {
        Self {
            catalog: Mutex::new(Catalog {
                size,
                unit_price: 0.1,
                quantity: 1_000,
            }),
            latency: Duration::ZERO,
            transient_failures: Mutex::new(HashMap::new()),
            permanent_failures: Mutex::new(HashSet::new()),
            rejected_clients: Mutex::new(HashSet::new()),
            quotas: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every product reports this price and quantity from now on
    pub fn set_market(&self, unit_price: f64, quantity: u64) {
        let mut catalog = locked(&self.catalog);
        catalog.unit_price = unit_price;
        catalog.quantity = quantity;
    }

    /// The next `times` page requests at `offset` fail with 503
    pub fn fail_offset(&self, offset: u64, times: u32) {
        locked(&self.transient_failures).insert(offset, times);
    }

    pub fn fail_offset_always(&self, offset: u64) {
        locked(&self.permanent_failures).insert(offset);
    }

    pub fn reject_client(&self, client_id: &str) {
        locked(&self.rejected_clients).insert(client_id.to_string());
    }

    /// Requests the client may still make; reported back in every page
    pub fn set_quota(&self, client_id: &str, remaining_requests: u64) {
        locked(&self.quotas).insert(client_id.to_string(), remaining_requests);
    }

    /// Page offsets requested so far (probe requests excluded)
    pub fn requested_offsets(&self) -> Vec<u64> {
        locked(&self.calls)
            .values()
            .flatten()
            .filter(|c| c.limit > 1)
            .map(|c| c.offset)
            .collect()
    }

    pub fn calls_for_client(&self, client_id: &str) -> Vec<RecordedCall> {
        locked(&self.calls)
            .get(client_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn requests_for(&self, offset: u64) -> usize {
        locked(&self.calls)
            .values()
            .flatten()
            .filter(|c| c.offset == offset && c.limit > 1)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self, offset: u64) -> Option<PageError> {
        if locked(&self.permanent_failures).contains(&offset) {
            return Some(PageError::http(503, "Service Unavailable"));
        }
        let mut transient = locked(&self.transient_failures);
        match transient.get_mut(&offset) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Some(PageError::http(503, "Service Unavailable"))
            }
            _ => None,
        }
    }

    fn remaining_requests(&self, client_id: &str) -> Option<u64> {
        let mut quotas = locked(&self.quotas);
        quotas.get_mut(client_id).map(|left| {
            *left = left.saturating_sub(1);
            *left
        })
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchTransport for ScriptedTransport {
    async fn exchange_token(
        &self,
        credential: &VendorCredential,
    ) -> Result<AccessToken, SyncError> {
        if locked(&self.rejected_clients).contains(&credential.client_id) {
            return Err(SyncError::Authentication(format!(
                "client {} rejected",
                credential.client_id
            )));
        }
        Ok(AccessToken::new(
            credential.client_id.clone(),
            format!("token-{}", credential.client_id),
        ))
    }

    async fn search(
        &self,
        token: &AccessToken,
        request: &SearchRequest,
    ) -> Result<SearchPage, PageError> {
        locked(&self.calls)
            .entry(token.client_id.clone())
            .or_default()
            .push(RecordedCall {
                offset: request.offset,
                limit: request.limit,
                at: Instant::now(),
            });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if request.limit > 1 {
            if let Some(err) = self.scripted_failure(request.offset) {
                return Err(err);
            }
        }

        let (size, unit_price, quantity) = {
            let catalog = locked(&self.catalog);
            (catalog.size, catalog.unit_price, catalog.quantity)
        };
        let end = request.offset.saturating_add(request.limit).min(size);
        let products = (request.offset..end)
            .map(|i| sample_product(&part_number(i), unit_price, quantity))
            .collect();

        Ok(SearchPage {
            total_count: size,
            products,
            remaining_requests: self.remaining_requests(&token.client_id),
        })
    }
}
