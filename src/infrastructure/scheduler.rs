//! Daily sync trigger at a fixed UTC hour

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::sync_service::{SyncRequest, SyncRunner};
use crate::domain::errors::SyncError;

/// First instant strictly after `now` whose UTC hour is `hour_utc` (minute 0)
pub fn next_run_after(now: DateTime<Utc>, hour_utc: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour_utc.min(23), 0, 0).unwrap_or_default();
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        now.date_naive()
            .checked_add_days(Days::new(1))
            .map_or(today, |tomorrow| tomorrow.and_time(at).and_utc())
    }
}

/// Runs a full sync every day at `hour_utc` until the task is aborted
pub fn spawn_daily(runner: Arc<SyncRunner>, hour_utc: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_run_after(now, hour_utc);
            info!("⏰ Next scheduled sync at {}", next.to_rfc3339());
            tokio::time::sleep((next - now).to_std().unwrap_or(Duration::ZERO)).await;

            match runner.run_exclusive(SyncRequest::default()).await {
                Ok(report) => info!(
                    "✅ Scheduled sync {} finished: {} inserted, {} updated",
                    report.run_id, report.inserted, report.updated
                ),
                Err(SyncError::AlreadyRunning) => {
                    info!("⏭️  Scheduled sync skipped, a run is in progress");
                }
                Err(e) => error!("❌ Scheduled sync failed: {}", e),
            }
        }
    })
}
