//! Background expiration worker for purging aged-out day-buckets
//!
//! Each pass computes the expiry boundary `now - ttl` and walks a fixed
//! trailing window of 30 days before it, probing every day-bucket in that
//! window and deleting the ones that still exist. Buckets further back than
//! the window are never revisited, so passes must run often enough that the
//! backlog stays under 30 days.
//!
//! Every probe and delete is best-effort: failures are logged and the pass
//! moves on. The next tick is the retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ExpirationConfig;
use crate::naming::bucket_address;
use crate::naming::key_generator::day_bucket;
use crate::storage::BlobStore;

/// Days before the expiry boundary inspected by one pass
pub const LOOKBACK_DAYS: i64 = 30;

/// Bucket addresses a pass at `now` inspects, newest first.
pub fn candidate_buckets(now: DateTime<Utc>, ttl: Duration) -> Vec<String> {
    let Some(boundary) = ChronoDuration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
    else {
        return Vec::new();
    };

    (1..=LOOKBACK_DAYS)
        .filter_map(|offset| boundary.checked_sub_signed(ChronoDuration::days(offset)))
        .map(|day| bucket_address(&day_bucket(day)))
        .collect()
}

/// Counters for one sweep pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub missing: usize,
    pub deleted: usize,
    pub probe_failures: usize,
    pub delete_failures: usize,
}

/// Background expiration worker
pub struct ExpirationWorker {
    store: Arc<dyn BlobStore>,
    ttl: Duration,
    interval: Duration,
}

impl ExpirationWorker {
    pub fn new(store: Arc<dyn BlobStore>, ttl: Duration, interval: Duration) -> Self {
        Self { store, ttl, interval }
    }

    pub fn from_config(store: Arc<dyn BlobStore>, config: &ExpirationConfig) -> Self {
        Self::new(store, config.default_ttl(), config.interval())
    }

    /// Run one pass as if the current time were `now`
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for address in candidate_buckets(now, self.ttl) {
            report.probed += 1;
            match self.store.head_exists(&address).await {
                Ok(true) => {}
                Ok(false) => {
                    report.missing += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Head of bucket {} failed: {}", address, e);
                    report.probe_failures += 1;
                    continue;
                }
            }

            match self.store.delete(&address).await {
                Ok(_) => {
                    info!("Expired day-bucket {}", address);
                    report.deleted += 1;
                }
                Err(e) => {
                    error!("Delete of bucket {} failed: {}", address, e);
                    report.delete_failures += 1;
                }
            }
        }

        report
    }

    /// Run passes on every tick until `shutdown` is cancelled. The first pass
    /// starts immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Starting expiration worker: ttl={}s, interval={}s",
            self.ttl.as_secs(),
            self.interval.as_secs()
        );

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            info!("Expiration pass started");
            let report = tokio::select! {
                _ = shutdown.cancelled() => break,
                report = self.sweep_once(Utc::now()) => report,
            };
            info!(
                "Expiration pass done: probed={}, deleted={}, missing={}, probe_failures={}, delete_failures={}",
                report.probed, report.deleted, report.missing, report.probe_failures, report.delete_failures
            );
        }

        info!("Expiration worker stopped");
    }

    /// Start the worker as a background task (non-blocking)
    pub fn start_background(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
