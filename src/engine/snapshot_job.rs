//! Daily snapshot job
//!
//! Aggregates the trailing usage window and merges the resulting summaries
//! into the snapshot store under today's snapshot date. The job itself does
//! not schedule anything: callers (the CLI `snapshot` command, or the
//! background task spawned by `serve`) decide when it runs.
//!
//! Persistence is at-most-once. If the store fails, the computed summaries are
//! still returned and the failure is reported alongside them.

use chrono::{Datelike, Days, NaiveDate, Timelike, Utc};
use std::sync::Arc;
use tokio::time::interval;

use super::pipeline::{aggregate_window, UsageSource, UsageWindow};
use crate::db::SnapshotStore;
use crate::usage::DailySummary;

/// Default retention period for snapshots (in days)
pub const DEFAULT_SNAPSHOT_RETENTION_DAYS: i64 = 365;

/// Result of one snapshot run
#[derive(Debug, Default)]
pub struct SnapshotRunResult {
    pub snapshot_date: Option<NaiveDate>,
    /// Raw rows read from the usage source
    pub rows_read: usize,
    /// Rows rejected by the normalizer
    pub rows_rejected: usize,
    /// Summaries computed for the window
    pub summaries: Vec<DailySummary>,
    /// Summaries written to the store
    pub snapshots_written: usize,
    /// First persistence error, if any write failed
    pub persistence_error: Option<String>,
}

impl SnapshotRunResult {
    pub fn persisted(&self) -> bool {
        self.persistence_error.is_none()
    }
}

/// Snapshot job over a usage source and a snapshot store
pub struct SnapshotJob {
    source: Arc<dyn UsageSource>,
    store: Arc<dyn SnapshotStore>,
    lookback_days: u32,
    retention_days: i64,
}

impl SnapshotJob {
    pub fn new(
        source: Arc<dyn UsageSource>,
        store: Arc<dyn SnapshotStore>,
        lookback_days: u32,
    ) -> Self {
        Self {
            source,
            store,
            lookback_days,
            retention_days: DEFAULT_SNAPSHOT_RETENTION_DAYS,
        }
    }

    pub fn with_retention(mut self, retention_days: i64) -> Self {
        self.retention_days = retention_days;
        self
    }

    /// Aggregate the window ending at `snapshot_date` and upsert every summary.
    ///
    /// Fails only when the window is out of range or the usage source cannot
    /// be read; store failures are reported in the result.
    pub async fn run(&self, snapshot_date: NaiveDate) -> anyhow::Result<SnapshotRunResult> {
        let window = UsageWindow::trailing(snapshot_date, self.lookback_days)?;
        let run = aggregate_window(self.source.as_ref(), window).await?;

        let mut result = SnapshotRunResult {
            snapshot_date: Some(snapshot_date),
            rows_read: run.rows_read,
            rows_rejected: run.rejected.len(),
            ..Default::default()
        };

        for summary in &run.summaries {
            match self.store.upsert(summary, snapshot_date).await {
                Ok(()) => result.snapshots_written += 1,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        service = %summary.service_type,
                        usage_date = %summary.usage_date,
                        "Failed to persist daily snapshot"
                    );
                    result.persistence_error = Some(e.to_string());
                    break;
                }
            }
        }

        tracing::trace!(
            snapshot_date = %snapshot_date,
            written = result.snapshots_written,
            "Snapshot run finished"
        );

        result.summaries = run.summaries;
        Ok(result)
    }

    /// Remove snapshots older than the retention period
    pub async fn cleanup(&self) -> u64 {
        let cutoff = u64::try_from(self.retention_days)
            .ok()
            .and_then(|days| Utc::now().date_naive().checked_sub_days(Days::new(days)));
        let Some(cutoff) = cutoff else {
            tracing::warn!(
                retention_days = self.retention_days,
                "Retention period out of range, skipping cleanup"
            );
            return 0;
        };

        match self.store.cleanup(cutoff).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::debug!(
                        deleted = deleted,
                        retention_days = self.retention_days,
                        "Cleaned up old snapshots"
                    );
                }
                deleted
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to cleanup old snapshots");
                0
            }
        }
    }
}

/// Spawn the background snapshot task
///
/// Checks once per `interval_secs` and runs the job when the UTC date has
/// changed since the last successful run. Retention cleanup happens on
/// Sundays during the first two hours.
pub fn spawn_snapshot_task(job: SnapshotJob, interval_secs: u64) {
    tracing::info!(
        lookback_days = job.lookback_days,
        retention_days = job.retention_days,
        "Starting snapshot background task"
    );

    tokio::spawn(async move {
        let mut tick = interval(std::time::Duration::from_secs(interval_secs.max(1)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut last_snapshot_date: Option<NaiveDate> = None;

        loop {
            tick.tick().await;

            let now = Utc::now();
            let today = now.date_naive();

            if last_snapshot_date != Some(today) {
                match job.run(today).await {
                    Ok(result) => {
                        tracing::info!(
                            date = %today,
                            rows = result.rows_read,
                            rejected = result.rows_rejected,
                            snapshots = result.snapshots_written,
                            persisted = result.persisted(),
                            "Daily snapshot completed"
                        );
                        if result.persisted() {
                            last_snapshot_date = Some(today);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, date = %today, "Daily snapshot failed");
                    }
                }
            }

            if now.weekday() == chrono::Weekday::Sun && now.hour() < 2 {
                job.cleanup().await;
            }
        }
    });
}
