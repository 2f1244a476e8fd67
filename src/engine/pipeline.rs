//! Usage pipeline: source rows → normalizer → aggregator.
//!
//! Everything here past the [`UsageSource`] read is pure: the same input rows
//! always produce the same summaries, and nothing is mutated in place.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use thiserror::Error;

use crate::db::{DbPool, StoreError, UsageRecord};
use crate::usage::{
    aggregate_to_vec, normalize_batch, DailySummary, RawUsageRow, RejectedRow, ServiceType,
};

/// Longest trailing window accepted, about ten years
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// A trailing window that cannot be represented
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("Window of {0} days exceeds the {max}-day limit", max = MAX_WINDOW_DAYS)]
    TooLong(u32),

    #[error("Window of {days} days ending {end} starts before the earliest supported date")]
    OutOfRange { end: NaiveDate, days: u32 },
}

/// Read-only access to raw usage rows
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Rows with usage dates within `[start, end]`, plus rows whose date
    /// cannot be parsed so the normalizer can reject them
    async fn fetch_window(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawUsageRow>, StoreError>;
}

/// Usage source over the local `usage_records` table
#[derive(Clone)]
pub struct SqliteUsageSource {
    db: DbPool,
}

impl SqliteUsageSource {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UsageSource for SqliteUsageSource {
    async fn fetch_window(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawUsageRow>, StoreError> {
        Ok(UsageRecord::list_window(&self.db, start, end).await?)
    }
}

/// Usage source over rows already held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticUsageSource {
    rows: Vec<RawUsageRow>,
}

impl StaticUsageSource {
    pub fn new(rows: Vec<RawUsageRow>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl UsageSource for StaticUsageSource {
    async fn fetch_window(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawUsageRow>, StoreError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| {
                crate::usage::parse_usage_date(&row.usage_time)
                    .map_or(true, |d| d >= start && d <= end)
            })
            .cloned()
            .collect())
    }
}

/// Trailing window of `days` days ending at `end` (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl UsageWindow {
    pub fn trailing(end: NaiveDate, days: u32) -> Result<Self, WindowError> {
        if days > MAX_WINDOW_DAYS {
            return Err(WindowError::TooLong(days));
        }
        let start = end
            .checked_sub_days(Days::new(u64::from(days)))
            .ok_or(WindowError::OutOfRange { end, days })?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Output of one aggregation run
#[derive(Debug, Clone, Default)]
pub struct AggregationRun {
    /// Rows read from the source
    pub rows_read: usize,
    /// Summaries ordered by date then service
    pub summaries: Vec<DailySummary>,
    /// Rows the normalizer refused
    pub rejected: Vec<RejectedRow>,
}

impl AggregationRun {
    pub fn for_service(&self, service_type: ServiceType) -> Vec<DailySummary> {
        self.summaries
            .iter()
            .filter(|s| s.service_type == service_type)
            .cloned()
            .collect()
    }
}

/// Normalize and aggregate raw rows
pub fn summarize(rows: &[RawUsageRow]) -> AggregationRun {
    let batch = normalize_batch(rows);
    let summaries = aggregate_to_vec(&batch.records);

    if !batch.rejected.is_empty() {
        tracing::warn!(
            rejected = batch.rejected.len(),
            invalid = batch.invalid_count(),
            unknown_service = batch.unknown_service_count(),
            "Some usage rows were rejected during normalization"
        );
    }

    AggregationRun {
        rows_read: rows.len(),
        summaries,
        rejected: batch.rejected,
    }
}

/// Fetch a window from `source` and aggregate it
pub async fn aggregate_window(
    source: &dyn UsageSource,
    window: UsageWindow,
) -> Result<AggregationRun, StoreError> {
    let rows = source.fetch_window(window.start, window.end).await?;
    let mut run = summarize(&rows);
    // Rows with unparseable dates are rejected above; the rest must sit in the window.
    run.summaries.retain(|s| window.contains(s.usage_date));

    tracing::debug!(
        start = %window.start,
        end = %window.end,
        rows = run.rows_read,
        summaries = run.summaries.len(),
        "Aggregated usage window"
    );

    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;

    fn raw(time: &str, service: &str, credits: Option<f64>, users: i64) -> RawUsageRow {
        RawUsageRow {
            usage_time: time.to_string(),
            service: service.to_string(),
            credits,
            request_count: Some(2),
            unique_users: Some(users),
            ..Default::default()
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_summarize_reports_rejections() {
        let rows = vec![
            raw("2025-01-01", "cortex_functions", Some(1.0), 1),
            raw("2025-01-01", "cortex_functions", Some(3.0), 1),
            raw("2025-01-01", "unknown", Some(3.0), 1),
            raw("2025-01-01", "cortex_functions", None, 1),
        ];

        let run = summarize(&rows);
        assert_eq!(run.rows_read, 4);
        assert_eq!(run.rejected.len(), 2);
        assert_eq!(run.summaries.len(), 1);
        assert_eq!(run.summaries[0].total_credits, 4.0);
        assert_eq!(run.summaries[0].total_operations, 4);
    }

    #[test]
    fn test_trailing_window() {
        let window = UsageWindow::trailing(date("2025-01-31"), 30).unwrap();
        assert_eq!(window.start, date("2025-01-01"));
        assert!(window.contains(date("2025-01-01")));
        assert!(!window.contains(date("2025-02-01")));
    }

    #[test]
    fn test_trailing_window_out_of_range() {
        assert_eq!(
            UsageWindow::trailing(date("2025-01-31"), u32::MAX),
            Err(WindowError::TooLong(u32::MAX))
        );
        assert!(matches!(
            UsageWindow::trailing(NaiveDate::MIN, 1),
            Err(WindowError::OutOfRange { days: 1, .. })
        ));
        assert!(UsageWindow::trailing(date("2025-01-31"), MAX_WINDOW_DAYS).is_ok());
    }

    #[tokio::test]
    async fn test_aggregate_window_from_static_source() {
        let source = StaticUsageSource::new(vec![
            raw("2024-12-01", "analyst", Some(50.0), 5),
            raw("2025-01-10 09:00:00", "analyst", Some(1.5), 1),
            raw("2025-01-10 17:00:00", "analyst", Some(2.5), 2),
            raw("bad-date", "analyst", Some(1.0), 1),
        ]);

        let window = UsageWindow::trailing(date("2025-01-31"), 30).unwrap();
        let run = aggregate_window(&source, window).await.unwrap();

        assert_eq!(run.rows_read, 3);
        assert_eq!(run.rejected.len(), 1);
        assert_eq!(run.summaries.len(), 1);
        assert_eq!(run.summaries[0].total_credits, 4.0);
        assert_eq!(run.summaries[0].daily_unique_actors, 3);
    }

    #[tokio::test]
    async fn test_aggregate_window_from_sqlite() {
        let db = init_in_memory().await.unwrap();
        UsageRecord::insert_many(
            &db,
            &[
                raw("2025-01-05", "search", Some(10.0), 0),
                raw("2025-01-05", "document_ai", Some(4.0), 2),
            ],
        )
        .await
        .unwrap();

        let source = SqliteUsageSource::new(db);
        let window = UsageWindow::trailing(date("2025-01-10"), 30).unwrap();
        let run = aggregate_window(&source, window).await.unwrap();

        assert_eq!(run.summaries.len(), 2);
        assert_eq!(run.for_service(ServiceType::CortexSearch)[0].total_credits, 10.0);
    }

    #[tokio::test]
    async fn test_sources_agree_on_unparseable_dates() {
        let rows = vec![
            raw("2025-01-05", "analyst", Some(1.0), 1),
            raw("not-a-date", "analyst", Some(1.0), 1),
        ];
        let db = init_in_memory().await.unwrap();
        UsageRecord::insert_many(&db, &rows).await.unwrap();
        let window = UsageWindow::trailing(date("2025-01-10"), 30).unwrap();

        let from_sqlite = aggregate_window(&SqliteUsageSource::new(db), window)
            .await
            .unwrap();
        let from_memory = aggregate_window(&StaticUsageSource::new(rows), window)
            .await
            .unwrap();

        for run in [from_sqlite, from_memory] {
            assert_eq!(run.rows_read, 2);
            assert_eq!(run.rejected.len(), 1);
            assert_eq!(run.summaries.len(), 1);
        }
    }
}
