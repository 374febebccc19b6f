//! End-to-end sync run: probe -> plan -> retrieve -> merge -> persist

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::application::history_merge::HistoryMergeEngine;
use crate::application::load_balancer::{dispatch_slices, plan_slices, probe_credentials};
use crate::application::normalizer::Normalizer;
use crate::application::page_fetcher::{InFlightLimiter, PageFetcher};
use crate::application::persistence_writer::PersistenceWriter;
use crate::application::remediation::{RemediationConfig, RemediationEngine};
use crate::application::retrieval_engine::{RetrievalConfig, RetrievalEngine};
use crate::domain::catalog::CaptureDate;
use crate::domain::credential::VendorCredential;
use crate::domain::errors::SyncError;
use crate::domain::repositories::{CatalogRepository, SearchTransport};
use crate::domain::vendor::SearchRequest;

/// Knobs of one sync run
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub credentials: Vec<VendorCredential>,
    pub search_template: SearchRequest,
    pub retrieval: RetrievalConfig,
    pub remediation: RemediationConfig,
    pub max_in_flight: usize,
    pub merge_workers: usize,
    pub write_batch_size: usize,
    /// Assumed requests left when the vendor reports no quota header
    pub fallback_quota_requests: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            search_template: SearchRequest::default(),
            retrieval: RetrievalConfig::default(),
            remediation: RemediationConfig::default(),
            max_in_flight: 15,
            merge_workers: 4,
            write_batch_size: 500,
            fallback_quota_requests: 1_000,
        }
    }
}

/// Optional overrides for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncRequest {
    pub start_offset: Option<u64>,
    /// Upper bound of the range; the vendor-reported count when absent
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub active_credentials: usize,
    pub start_offset: u64,
    pub total: u64,
    pub records_retrieved: usize,
    pub remediated_pages: usize,
    pub abandoned_offsets: Vec<u64>,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: usize,
}

pub struct SyncService {
    transport: Arc<dyn SearchTransport>,
    repository: Arc<dyn CatalogRepository>,
    settings: SyncSettings,
    capture_date: Option<CaptureDate>,
}

impl SyncService {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        repository: Arc<dyn CatalogRepository>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            transport,
            repository,
            settings,
            capture_date: None,
        }
    }

    /// Stamps snapshots with `date` instead of the current UTC day
    #[must_use]
    pub fn with_capture_date(mut self, date: CaptureDate) -> Self {
        self.capture_date = Some(date);
        self
    }

    pub async fn run(&self, request: SyncRequest) -> Result<SyncReport, SyncError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id);
        self.run_inner(run_id, request).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, request: SyncRequest) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        let page_size = self.settings.retrieval.page_size;
        let mut template = self.settings.search_template.clone();
        template.limit = page_size;
        let start_offset = request.start_offset.unwrap_or(template.offset);
        template.offset = start_offset;

        info!("🚀 Sync run started with {} credentials", self.settings.credentials.len());

        let budgets = probe_credentials(
            &self.transport,
            &self.settings.credentials,
            &template,
            page_size,
            self.settings.fallback_quota_requests,
        )
        .await;
        let active_credentials = budgets.iter().filter(|b| b.is_active).count();
        if active_credentials == 0 {
            error!("❌ No active credentials");
            return Err(SyncError::NoActiveCredentials);
        }

        let total = match request.total {
            Some(total) => total,
            None => budgets
                .iter()
                .filter(|b| b.is_active)
                .find_map(|b| b.observed_total)
                .ok_or_else(|| SyncError::CountUnavailable("no probe reported a count".into()))?,
        };
        info!("📊 Range {}..{} across {} credentials", start_offset, total, active_credentials);

        let slices = plan_slices(&budgets, start_offset, total, page_size)?;
        for slice in &slices {
            info!(
                "🧩 {} -> {}..{} ({} records)",
                slice.client_id,
                slice.start_offset,
                slice.end_offset,
                slice.len()
            );
        }

        let fetcher = PageFetcher::new(
            self.transport.clone(),
            InFlightLimiter::new(self.settings.max_in_flight),
            self.capture_date.map_or_else(Normalizer::today, Normalizer::new),
        );
        let engine = RetrievalEngine::new(
            fetcher,
            RemediationEngine::new(self.settings.remediation),
            self.settings.retrieval,
        );
        let outcomes = dispatch_slices(&engine, &budgets, &slices, &template).await?;

        let mut records = Vec::new();
        let mut remediated_pages = 0;
        let mut abandoned_offsets = Vec::new();
        for (_, outcome) in outcomes {
            remediated_pages += outcome.remediated.len();
            abandoned_offsets.extend(outcome.abandoned);
            records.extend(outcome.records);
        }
        abandoned_offsets.sort_unstable();
        let records_retrieved = records.len();

        let mut part_numbers: Vec<String> = records.iter().map(|r| r.part_number.clone()).collect();
        part_numbers.sort_unstable();
        part_numbers.dedup();
        let stored: HashMap<_, _> = self
            .repository
            .find_by_part_numbers(&part_numbers)
            .await?
            .into_iter()
            .map(|r| (r.part_number.clone(), r))
            .collect();

        let merge = HistoryMergeEngine::new(self.settings.merge_workers);
        let plan = tokio::task::spawn_blocking(move || merge.plan(records, &stored))
            .await
            .map_err(|e| SyncError::Configuration(format!("merge task failed: {e}")))?;

        let writer =
            PersistenceWriter::new(self.repository.clone(), self.settings.write_batch_size);
        let written = writer.apply(&plan).await?;

        let report = SyncReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            active_credentials,
            start_offset,
            total,
            records_retrieved,
            remediated_pages,
            abandoned_offsets,
            inserted: written.inserted,
            updated: written.updated,
            unchanged: plan.unchanged,
        };
        info!(
            "🏁 Sync run finished: {} retrieved, {} inserted, {} updated, {} unchanged",
            report.records_retrieved, report.inserted, report.updated, report.unchanged
        );
        Ok(report)
    }
}

/// Serializes sync runs; at most one runs at a time
pub struct SyncRunner {
    service: Arc<SyncService>,
    running: AtomicBool,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncRunner {
    pub fn new(service: Arc<SyncService>) -> Self {
        Self {
            service,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> Result<(), SyncError> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| SyncError::AlreadyRunning)
    }

    /// Runs a sync unless one is already in progress
    pub async fn run_exclusive(&self, request: SyncRequest) -> Result<SyncReport, SyncError> {
        self.acquire()?;
        let _guard = RunningGuard(&self.running);
        self.service.run(request).await
    }

    /// Claims the run slot now and runs the sync on a background task
    pub fn spawn_exclusive(
        self: &Arc<Self>,
        request: SyncRequest,
    ) -> Result<JoinHandle<Result<SyncReport, SyncError>>, SyncError> {
        self.acquire()?;
        let runner = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _guard = RunningGuard(&runner.running);
            let result = runner.service.run(request).await;
            if let Err(e) = &result {
                error!("❌ Background sync failed: {}", e);
            }
            result
        }))
    }
}
