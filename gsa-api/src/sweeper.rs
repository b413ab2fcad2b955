//  SWEEPER.rs
//
//  Description:
//!   The stall sweeper: a background task co-resident with the API that
//!   promotes silently-stuck `running` jobs to `failed` once they have
//!   gone longer than their role's stall timeout without a progress
//!   update.

use std::fmt::Display;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::interval;

use specifications::data::{DatasetLoadingStatus, LoadingTransitionError};
use specifications::job::{StatusRecord, TransitionError};
use specifications::report::{ReportStatus, ReportTransitionError};

use gsa_shr::blackboard::{TRACKED_ANALYSIS, TRACKED_DATASET, TRACKED_REPORT};

use crate::spec::Context;

/// The handful of fields every status record kind exposes to the sweep: a
/// terminal check, a last-update timestamp, and a `fail` transition.
/// `StatusRecord`, `DatasetLoadingStatus` and `ReportStatus` each already
/// shape these identically; this trait just lets one sweep loop drive all
/// three instead of one near-identical copy per job kind.
trait StallableStatus: Clone + Sized {
    type FailErr: Display;

    fn is_terminal(&self) -> bool;
    fn last_update(&self) -> DateTime<Utc>;
    fn fail_stalled(self, now: DateTime<Utc>) -> Result<Self, Self::FailErr>;
}

impl StallableStatus for StatusRecord {
    type FailErr = TransitionError;

    fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    fn fail_stalled(self, now: DateTime<Utc>) -> Result<Self, Self::FailErr> {
        self.fail("worker timeout", now)
    }
}

impl StallableStatus for DatasetLoadingStatus {
    type FailErr = LoadingTransitionError;

    fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    fn fail_stalled(self, now: DateTime<Utc>) -> Result<Self, Self::FailErr> {
        self.fail("worker timeout", now)
    }
}

impl StallableStatus for ReportStatus {
    type FailErr = ReportTransitionError;

    fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    fn fail_stalled(self, now: DateTime<Utc>) -> Result<Self, Self::FailErr> {
        self.fail("worker timeout", now)
    }
}

/// Runs the sweep forever at the configured cadence. Intended to be
/// `tokio::spawn`ed alongside `warp::serve` in `main`.
pub async fn run(context: Context) {
    let mut ticker = interval(context.config.progress_update_interval());
    loop {
        ticker.tick().await;
        sweep::<StatusRecord>(&context, TRACKED_ANALYSIS, context.config.max_worker_timeout(), "analysis job").await;
        sweep::<DatasetLoadingStatus>(&context, TRACKED_DATASET, context.config.loading_max_timeout(), "dataset load").await;
        sweep::<ReportStatus>(&context, TRACKED_REPORT, context.config.max_worker_timeout(), "report job").await;
    }
}

/// Sweeps every id tracked under `tracked_key`, promoting any job of status
/// kind `T` that has gone longer than `timeout` without a progress update
/// to `failed`. `label` is used only for log lines.
async fn sweep<T>(context: &Context, tracked_key: &str, timeout: Duration, label: &str)
where
    T: StallableStatus + DeserializeOwned + Serialize,
{
    let ids = match gsa_shr::blackboard::tracked_ids(context.blackboard.as_ref(), tracked_key).await {
        Ok(ids) => ids,
        Err(err) => {
            warn!("Failed to read {label} tracking index: {err}");
            return;
        }
    };
    for id in ids {
        let key = format!("status:{id}");
        let raw = match context.blackboard.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                let _ = gsa_shr::blackboard::untrack(context.blackboard.as_ref(), tracked_key, &id).await;
                continue;
            }
            Err(err) => {
                warn!("Failed to read status for {label} '{id}': {err}");
                continue;
            }
        };
        let record: T = match serde_json::from_slice(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!("Failed to decode status record for {label} '{id}': {err}");
                continue;
            }
        };
        if record.is_terminal() {
            let _ = gsa_shr::blackboard::untrack(context.blackboard.as_ref(), tracked_key, &id).await;
            continue;
        }
        let now = Utc::now();
        if (now - record.last_update()).to_std().unwrap_or_default() < timeout {
            continue;
        }
        info!("{label} '{id}' stalled; promoting to failed");
        let failed = match record.clone().fail_stalled(now) {
            Ok(failed) => failed,
            Err(err) => {
                warn!("Failed to build failure transition for {label} '{id}': {err}");
                continue;
            }
        };
        let encoded = match serde_json::to_vec(&failed) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("Failed to encode failed status for {label} '{id}': {err}");
                continue;
            }
        };
        match context.blackboard.compare_and_set(&key, Some(&raw), encoded, Some(context.config.status_ttl())).await {
            Ok(true) => {
                let _ = gsa_shr::blackboard::untrack(context.blackboard.as_ref(), tracked_key, &id).await;
            }
            Ok(false) => debug_concurrent_write(&id),
            Err(err) => warn!("Failed to write stalled status for {label} '{id}': {err}"),
        }
    }
}

fn debug_concurrent_write(job_id: &str) {
    info!("Status for '{job_id}' changed concurrently with the sweep; leaving it for the next tick");
}
