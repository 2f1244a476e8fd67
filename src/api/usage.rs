//! Usage API endpoints.
//!
//! Daily summaries are aggregated live from the imported usage rows; the
//! trend view reads the persisted daily snapshots.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::engine::{aggregate_window, build_trend, TrendPoint, UsageWindow};
use crate::report::{export_rows, to_csv_bytes, CreditPrice, ExportRow};
use crate::usage::{DailySummary, ServiceType};
use crate::AppState;

/// Query parameters shared by the usage endpoints
#[derive(Debug, Deserialize)]
pub struct UsageQueryParams {
    /// Window length: 7d, 30d, or 90d (default: 30d)
    #[serde(default = "default_period")]
    pub period: String,
    /// Last day of the window (default: today, UTC)
    #[serde(default)]
    pub end: Option<NaiveDate>,
    /// Service id or display name, required by the trend endpoint
    #[serde(default)]
    pub service: Option<String>,
    /// Override the configured credit price
    #[serde(default)]
    pub credit_price: Option<f64>,
}

pub(super) fn default_period() -> String {
    "30d".to_string()
}

/// Parse period string to days
pub(super) fn parse_period(period: &str) -> Result<u32, ApiError> {
    match period {
        "7d" => Ok(7),
        "30d" => Ok(30),
        "90d" => Ok(90),
        _ => {
            tracing::warn!("Invalid period: {}", period);
            Err(ApiError::validation_field(
                "period",
                format!("Invalid period '{}': expected 7d, 30d or 90d", period),
            ))
        }
    }
}

pub(super) fn resolve_window(
    period: &str,
    end: Option<NaiveDate>,
) -> Result<UsageWindow, ApiError> {
    let days = parse_period(period)?;
    let end = end.unwrap_or_else(|| Utc::now().date_naive());
    Ok(UsageWindow::trailing(end, days)?)
}

pub(super) fn resolve_price(
    state: &AppState,
    override_price: Option<f64>,
) -> Result<CreditPrice, ApiError> {
    Ok(CreditPrice::new(
        override_price.unwrap_or(state.config.pricing.credit_price),
    )?)
}

/// Aggregate the usage window into daily summaries
pub(super) async fn load_summaries(
    state: &AppState,
    window: UsageWindow,
) -> Result<(Vec<DailySummary>, usize), ApiError> {
    let run = aggregate_window(state.usage_source.as_ref(), window).await?;
    Ok((run.summaries, run.rejected.len()))
}

/// Daily usage response
#[derive(Debug, Serialize)]
pub struct DailyUsageResponse {
    pub period: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub credit_price: f64,
    /// Export rows, newest date first
    pub rows: Vec<ExportRow>,
    /// Raw rows skipped by the normalizer
    pub rejected_rows: usize,
}

/// Get daily usage summaries
///
/// GET /api/usage/daily?period=7d|30d|90d&end=YYYY-MM-DD
pub async fn get_daily_usage(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UsageQueryParams>,
) -> Result<Json<DailyUsageResponse>, ApiError> {
    let window = resolve_window(&params.period, params.end)?;
    let price = resolve_price(&state, params.credit_price)?;
    let (summaries, rejected_rows) = load_summaries(&state, window).await?;

    Ok(Json(DailyUsageResponse {
        period: params.period,
        start: window.start,
        end: window.end,
        credit_price: price.value(),
        rows: export_rows(&summaries, price),
        rejected_rows,
    }))
}

/// Trend response for one service
#[derive(Debug, Serialize)]
pub struct TrendResponse {
    pub service_type: ServiceType,
    pub period: String,
    /// Oldest first
    pub points: Vec<TrendPoint>,
}

/// Get the week-over-week credit trend from stored snapshots
///
/// GET /api/usage/trend?service=cortex_analyst&period=7d|30d|90d
pub async fn get_usage_trend(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UsageQueryParams>,
) -> Result<Json<TrendResponse>, ApiError> {
    let window = resolve_window(&params.period, params.end)?;
    let raw_service = params
        .service
        .as_deref()
        .ok_or_else(|| ApiError::validation_field("service", "service is required"))?;
    let service_type = ServiceType::parse(raw_service).ok_or_else(|| {
        ApiError::validation_field("service", format!("Unknown service type '{}'", raw_service))
    })?;

    let points = build_trend(state.snapshot_store.as_ref(), service_type, window).await?;

    Ok(Json(TrendResponse {
        service_type,
        period: params.period,
        points,
    }))
}

/// Download daily usage as CSV
///
/// GET /api/export/daily.csv?period=7d|30d|90d
pub async fn export_daily_csv(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UsageQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let window = resolve_window(&params.period, params.end)?;
    let price = resolve_price(&state, params.credit_price)?;
    let (summaries, _) = load_summaries(&state, window).await?;

    let body = to_csv_bytes(&export_rows(&summaries, price))?;
    let disposition = format!(
        "attachment; filename=\"daily_usage_{}_{}.csv\"",
        window.start.format("%Y%m%d"),
        window.end.format("%Y%m%d")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
