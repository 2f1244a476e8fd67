//! Historical snapshot store.
//!
//! The aggregation pipeline hands finished [`DailySummary`] values to a
//! [`SnapshotStore`]; projections and trend views read them back. Each
//! `upsert` writes exactly one row, so a failure never leaves a partial write.
//! Retrying is left to the caller.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;

use super::{DailySnapshot, DbPool};
use crate::usage::{DailySummary, ServiceType};

/// Errors from the snapshot store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Snapshot store unavailable: {0}")]
    Unavailable(String),

    #[error("Snapshot row could not be read: {0}")]
    CorruptRow(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Persistence contract for daily summaries
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store or replace the summary under `(snapshot_date, service_type, usage_date)`
    async fn upsert(
        &self,
        summary: &DailySummary,
        snapshot_date: NaiveDate,
    ) -> Result<(), StoreError>;

    /// Summaries for `service_type` with usage dates in `[start, end]`, ordered by date
    async fn query_window(
        &self,
        service_type: ServiceType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailySummary>, StoreError>;

    /// The summary exactly `days_back` calendar days before `usage_date`, if one exists
    async fn lookback(
        &self,
        service_type: ServiceType,
        usage_date: NaiveDate,
        days_back: i64,
    ) -> Result<Option<DailySummary>, StoreError>;

    /// Delete snapshots taken before `cutoff`; returns the number removed
    async fn cleanup(&self, cutoff: NaiveDate) -> Result<u64, StoreError>;
}

/// Snapshot store backed by the `daily_snapshots` SQLite table
#[derive(Clone)]
pub struct SqliteSnapshotStore {
    db: DbPool,
}

impl SqliteSnapshotStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

/// `date` shifted back by `days_back` days, `None` outside chrono's range
fn days_before(date: NaiveDate, days_back: i64) -> Option<NaiveDate> {
    if days_back >= 0 {
        date.checked_sub_days(Days::new(days_back.unsigned_abs()))
    } else {
        date.checked_add_days(Days::new(days_back.unsigned_abs()))
    }
}

fn to_summary(row: DailySnapshot) -> Result<DailySummary, StoreError> {
    let context = format!("{} {} {}", row.snapshot_date, row.service_type, row.usage_date);
    row.into_summary().ok_or(StoreError::CorruptRow(context))
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn upsert(
        &self,
        summary: &DailySummary,
        snapshot_date: NaiveDate,
    ) -> Result<(), StoreError> {
        DailySnapshot::upsert(&self.db, summary, snapshot_date).await?;
        Ok(())
    }

    async fn query_window(
        &self,
        service_type: ServiceType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailySummary>, StoreError> {
        DailySnapshot::get_window(&self.db, service_type, start, end)
            .await?
            .into_iter()
            .map(to_summary)
            .collect()
    }

    async fn lookback(
        &self,
        service_type: ServiceType,
        usage_date: NaiveDate,
        days_back: i64,
    ) -> Result<Option<DailySummary>, StoreError> {
        let Some(target) = days_before(usage_date, days_back) else {
            return Ok(None);
        };
        DailySnapshot::get_for_date(&self.db, service_type, target)
            .await?
            .map(to_summary)
            .transpose()
    }

    async fn cleanup(&self, cutoff: NaiveDate) -> Result<u64, StoreError> {
        Ok(DailySnapshot::cleanup_before(&self.db, cutoff).await?)
    }
}

type MemoryKey = (NaiveDate, ServiceType, NaiveDate);

/// In-process snapshot store, same read semantics as the SQLite store
#[derive(Default)]
pub struct MemorySnapshotStore {
    // (snapshot_date, service_type, usage_date)
    rows: RwLock<BTreeMap<MemoryKey, DailySummary>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn latest(&self, service_type: ServiceType, usage_date: NaiveDate) -> Option<DailySummary> {
        self.rows
            .read()
            .iter()
            .filter(|((_, service, date), _)| *service == service_type && *date == usage_date)
            .max_by_key(|((snapshot, _, _), _)| *snapshot)
            .map(|(_, summary)| summary.clone())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn upsert(
        &self,
        summary: &DailySummary,
        snapshot_date: NaiveDate,
    ) -> Result<(), StoreError> {
        self.rows.write().insert(
            (snapshot_date, summary.service_type, summary.usage_date),
            summary.clone(),
        );
        Ok(())
    }

    async fn query_window(
        &self,
        service_type: ServiceType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailySummary>, StoreError> {
        let mut latest: BTreeMap<NaiveDate, (NaiveDate, DailySummary)> = BTreeMap::new();

        for ((snapshot, service, date), summary) in self.rows.read().iter() {
            if *service != service_type || *date < start || *date > end {
                continue;
            }
            let newer = latest.get(date).map_or(true, |(seen, _)| snapshot > seen);
            if newer {
                latest.insert(*date, (*snapshot, summary.clone()));
            }
        }

        Ok(latest.into_values().map(|(_, summary)| summary).collect())
    }

    async fn lookback(
        &self,
        service_type: ServiceType,
        usage_date: NaiveDate,
        days_back: i64,
    ) -> Result<Option<DailySummary>, StoreError> {
        Ok(days_before(usage_date, days_back).and_then(|target| self.latest(service_type, target)))
    }

    async fn cleanup(&self, cutoff: NaiveDate) -> Result<u64, StoreError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|(snapshot, _, _), _| *snapshot >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

/// Week-over-week style growth between two values, in percent.
///
/// Undefined (`None`) when there is no previous value or it is zero; a
/// missing lookback must never read as "0% growth".
pub fn growth_pct(current: f64, previous: Option<f64>) -> Option<f64> {
    match previous {
        Some(prev) if prev != 0.0 => Some((current - prev) / prev * 100.0),
        _ => None,
    }
}
