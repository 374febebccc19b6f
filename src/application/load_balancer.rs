//! Splits a record range across vendor credentials by remaining quota.
//!
//! Every active credential gets a nominal share. Credentials that cannot
//! afford their share push the shortfall into a floating surplus, which the
//! better-funded credentials (visited in ascending quota order) absorb.
//! Slices are contiguous and assigned from a single moving cursor.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tracing::{error, info, warn};

use crate::application::retrieval_engine::{RetrievalEngine, RetrievalOutcome};
use crate::domain::credential::{CredentialBudget, VendorCredential};
use crate::domain::errors::SyncError;
use crate::domain::repositories::SearchTransport;
use crate::domain::vendor::SearchRequest;

/// Half-open record range `[start_offset, end_offset)` owned by one credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceAssignment {
    pub client_id: String,
    pub start_offset: u64,
    pub end_offset: u64,
}

impl SliceAssignment {
    pub const fn len(&self) -> u64 {
        self.end_offset - self.start_offset
    }

    pub const fn is_empty(&self) -> bool {
        self.end_offset == self.start_offset
    }
}

/// Exchanges tokens and reads remaining quota for every credential concurrently.
///
/// A credential whose token exchange or probe request fails comes back inactive.
/// Without a quota header the credential is assumed to have
/// `fallback_requests` requests left.
pub async fn probe_credentials(
    transport: &Arc<dyn SearchTransport>,
    credentials: &[VendorCredential],
    template: &SearchRequest,
    page_size: u64,
    fallback_requests: u64,
) -> Vec<CredentialBudget> {
    let probes = credentials.iter().map(|credential| async move {
        let token = match transport.exchange_token(credential).await {
            Ok(token) => token,
            Err(e) => {
                warn!("🔑 Credential {} unusable: {}", credential.client_id, e);
                return CredentialBudget::inactive(credential.clone());
            }
        };

        let mut probe = template.clone();
        probe.limit = 1;
        match transport.search(&token, &probe).await {
            Ok(page) => {
                let requests = page.remaining_requests.unwrap_or(fallback_requests);
                info!(
                    "🔎 Credential {}: {} requests left, {} records reported",
                    credential.client_id, requests, page.total_count
                );
                CredentialBudget {
                    credential: credential.clone(),
                    access_token: Some(token),
                    remaining_quota: requests.saturating_mul(page_size),
                    is_active: true,
                    observed_total: Some(page.total_count),
                }
            }
            Err(e) => {
                warn!("🔎 Probe for credential {} failed: {}", credential.client_id, e);
                CredentialBudget::inactive(credential.clone())
            }
        }
    });
    join_all(probes).await
}

/// Plans contiguous slices covering `[start_offset, total)`.
///
/// Inactive budgets are ignored. Fails when no budget is active or when the
/// combined quota leaves part of the range uncovered.
pub fn plan_slices(
    budgets: &[CredentialBudget],
    start_offset: u64,
    total: u64,
    page_size: u64,
) -> Result<Vec<SliceAssignment>, SyncError> {
    if page_size == 0 {
        return Err(SyncError::Configuration("page size must be positive".into()));
    }
    let mut active: Vec<&CredentialBudget> = budgets.iter().filter(|b| b.is_active).collect();
    if active.is_empty() {
        return Err(SyncError::NoActiveCredentials);
    }

    let pending_pages = total.saturating_sub(start_offset).div_ceil(page_size);
    if pending_pages == 0 {
        return Ok(Vec::new());
    }
    let nominal = pending_pages.div_ceil(active.len() as u64) * page_size;

    active.sort_by_key(|b| b.remaining_quota);

    let mut floating = 0u64;
    let mut cursor = start_offset;
    let mut slices = Vec::with_capacity(active.len());
    for budget in active {
        // Quotas only buy whole pages
        let quota = budget.remaining_quota - budget.remaining_quota % page_size;
        let share = if quota < nominal {
            floating += nominal - quota;
            quota
        } else {
            let spare = quota - nominal;
            if spare >= floating {
                let share = nominal + floating;
                floating = 0;
                share
            } else {
                floating -= spare;
                quota
            }
        };

        let end = cursor.saturating_add(share).min(total);
        if end > cursor {
            slices.push(SliceAssignment {
                client_id: budget.client_id().to_string(),
                start_offset: cursor,
                end_offset: end,
            });
            cursor = end;
        }
    }

    if cursor < total {
        let uncovered = total - cursor;
        error!("💸 Combined quota leaves {} records uncovered", uncovered);
        return Err(SyncError::InsufficientQuota { uncovered });
    }
    Ok(slices)
}

/// Runs every slice concurrently, each with its own engine and marker table.
///
/// The first slice to fail fails the whole dispatch.
pub async fn dispatch_slices(
    engine: &RetrievalEngine,
    budgets: &[CredentialBudget],
    slices: &[SliceAssignment],
    template: &SearchRequest,
) -> Result<Vec<(SliceAssignment, RetrievalOutcome)>, SyncError> {
    let runs = slices.iter().map(|slice| async move {
        let token = budgets
            .iter()
            .find(|b| b.client_id() == slice.client_id)
            .and_then(|b| b.access_token.as_ref())
            .ok_or_else(|| SyncError::SliceFailed {
                credential: slice.client_id.clone(),
                reason: "no access token".into(),
            })?;
        let outcome = engine
            .retrieve(token, &template.at_offset(slice.start_offset), slice.end_offset)
            .await
            .map_err(|e| {
                error!(
                    "❌ Slice {}..{} for {} failed: {}",
                    slice.start_offset, slice.end_offset, slice.client_id, e
                );
                match e {
                    SyncError::RemediationExhausted { .. } => e,
                    other => SyncError::SliceFailed {
                        credential: slice.client_id.clone(),
                        reason: other.to_string(),
                    },
                }
            })?;
        Ok::<_, SyncError>((slice.clone(), outcome))
    });
    try_join_all(runs).await
}
