//! Week-over-week trend view over stored snapshots.

use serde::Serialize;

use super::pipeline::UsageWindow;
use crate::db::{growth_pct, SnapshotStore, StoreError};
use crate::usage::ServiceType;

/// Days compared by the trend view
pub const WEEK_OVER_WEEK_DAYS: i64 = 7;

/// Credits for one day next to the same weekday one week earlier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub usage_date: chrono::NaiveDate,
    pub service_type: ServiceType,
    pub total_credits: f64,
    pub credits_7d_ago: Option<f64>,
    /// `None` when the earlier day is missing or had zero credits
    pub wow_growth_pct: Option<f64>,
}

/// Build the trend for `service_type` across `window`, oldest first
pub async fn build_trend(
    store: &dyn SnapshotStore,
    service_type: ServiceType,
    window: UsageWindow,
) -> Result<Vec<TrendPoint>, StoreError> {
    let summaries = store
        .query_window(service_type, window.start, window.end)
        .await?;

    let mut points = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let previous = store
            .lookback(service_type, summary.usage_date, WEEK_OVER_WEEK_DAYS)
            .await?
            .map(|s| s.total_credits);

        points.push(TrendPoint {
            usage_date: summary.usage_date,
            service_type,
            total_credits: summary.total_credits,
            credits_7d_ago: previous,
            wow_growth_pct: growth_pct(summary.total_credits, previous),
        });
    }

    Ok(points)
}
