//! Projection and report API endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::usage::{default_period, load_summaries, resolve_price, resolve_window};
use crate::engine::{
    compare_scenarios, project_portfolio, Baseline, BaselineMode, GrowthScenario, Horizon,
    ScenarioProjection, VarianceBand,
};
use crate::report::{
    executive_summary, round_credits, round_currency, CreditPrice, ExecutiveSummary,
};
use crate::AppState;

/// Query parameters for projection endpoints
#[derive(Debug, Deserialize)]
pub struct ProjectionQueryParams {
    /// History window: 7d, 30d, or 90d (default: 30d)
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    /// Preset scenario name
    #[serde(default)]
    pub scenario: Option<String>,
    /// Custom monthly growth rate; wins over `scenario`
    #[serde(default)]
    pub growth_rate: Option<f64>,
    #[serde(default)]
    pub months: Option<u32>,
    /// "daily" or "monthly"
    #[serde(default)]
    pub baseline: Option<String>,
    #[serde(default)]
    pub credit_price: Option<f64>,
}

struct ProjectionInputs {
    horizon: Horizon,
    mode: BaselineMode,
    price: CreditPrice,
    variance_pct: f64,
}

fn resolve_inputs(
    state: &AppState,
    params: &ProjectionQueryParams,
) -> Result<ProjectionInputs, ApiError> {
    let horizon = Horizon::new(params.months.unwrap_or(state.config.projection.horizon_months))?;

    let mode = match &params.baseline {
        Some(raw) => BaselineMode::parse(raw).ok_or_else(|| {
            ApiError::validation_field("baseline", format!("Unknown baseline mode '{}'", raw))
        })?,
        None => state
            .config
            .projection
            .baseline_mode()
            .map_err(|e| ApiError::internal(e.to_string()))?,
    };

    Ok(ProjectionInputs {
        horizon,
        mode,
        price: resolve_price(state, params.credit_price)?,
        variance_pct: state.config.report.variance_pct,
    })
}

fn custom_scenario(rate: f64) -> Result<GrowthScenario, ApiError> {
    Ok(GrowthScenario::custom(
        format!("Custom ({:.0}%)", rate * 100.0),
        rate,
    )?)
}

fn resolve_scenario(
    state: &AppState,
    params: &ProjectionQueryParams,
) -> Result<GrowthScenario, ApiError> {
    if let Some(rate) = params.growth_rate {
        return custom_scenario(rate);
    }
    match &params.scenario {
        Some(name) => GrowthScenario::preset(name).ok_or_else(|| {
            ApiError::validation_field("scenario", format!("Unknown scenario '{}'", name))
        }),
        None => state
            .config
            .projection
            .growth_scenario()
            .map_err(|e| ApiError::internal(e.to_string())),
    }
}

fn rounded_cost_band(
    credits: f64,
    price: CreditPrice,
    variance_pct: f64,
) -> Result<VarianceBand, ApiError> {
    let band = VarianceBand::new(price.cost_of(credits), variance_pct)?;
    Ok(VarianceBand {
        lower: round_currency(band.lower),
        expected: round_currency(band.expected),
        upper: round_currency(band.upper),
    })
}

/// List the preset growth scenarios
///
/// GET /api/scenarios
pub async fn list_scenarios() -> Json<Vec<GrowthScenario>> {
    Json(GrowthScenario::presets())
}

/// Projection response
#[derive(Debug, Serialize)]
pub struct ProjectionResponse {
    pub period: String,
    pub history_start: NaiveDate,
    pub history_end: NaiveDate,
    pub baseline_mode: BaselineMode,
    pub horizon_months: u32,
    pub credit_price: f64,
    pub baselines: Vec<Baseline>,
    pub projection: ScenarioProjection,
    /// Credits over months 1..=horizon
    pub horizon_total_credits: f64,
    pub horizon_total_cost: VarianceBand,
}

/// Project every service with history in the window under one scenario
///
/// GET /api/projections?period=30d&scenario=moderate&months=12
pub async fn get_projection(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProjectionQueryParams>,
) -> Result<Json<ProjectionResponse>, ApiError> {
    let window = resolve_window(&params.period, params.end)?;
    let inputs = resolve_inputs(&state, &params)?;
    let scenario = resolve_scenario(&state, &params)?;

    let (summaries, _) = load_summaries(&state, window).await?;
    let baselines = Baseline::all_from_history(&summaries, inputs.mode);
    if baselines.is_empty() {
        return Err(ApiError::not_found(
            "No usage history in the selected window; no projection possible",
        ));
    }

    let projection = project_portfolio(&baselines, &scenario, inputs.horizon);
    let total = projection.horizon_total();

    Ok(Json(ProjectionResponse {
        period: params.period,
        history_start: window.start,
        history_end: window.end,
        baseline_mode: inputs.mode,
        horizon_months: inputs.horizon.months(),
        credit_price: inputs.price.value(),
        horizon_total_credits: round_credits(total),
        horizon_total_cost: rounded_cost_band(total, inputs.price, inputs.variance_pct)?,
        baselines,
        projection,
    }))
}

/// One scenario's headline figures
#[derive(Debug, Serialize)]
pub struct ScenarioComparison {
    pub scenario: String,
    pub monthly_growth_rate: f64,
    pub horizon_total_credits: f64,
    pub horizon_total_cost: VarianceBand,
    pub final_month_credits: f64,
    pub final_month_cost: f64,
}

#[derive(Debug, Serialize)]
pub struct CompareResponse {
    pub horizon_months: u32,
    pub credit_price: f64,
    /// Slowest scenario first
    pub scenarios: Vec<ScenarioComparison>,
}

/// Compare the preset scenarios (plus a custom rate, when given)
///
/// GET /api/projections/compare?period=30d&months=12
pub async fn compare_projections(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProjectionQueryParams>,
) -> Result<Json<CompareResponse>, ApiError> {
    let window = resolve_window(&params.period, params.end)?;
    let inputs = resolve_inputs(&state, &params)?;

    let mut scenarios = GrowthScenario::presets();
    if let Some(rate) = params.growth_rate {
        scenarios.push(custom_scenario(rate)?);
    }

    let (summaries, _) = load_summaries(&state, window).await?;
    let baselines = Baseline::all_from_history(&summaries, inputs.mode);
    if baselines.is_empty() {
        return Err(ApiError::not_found(
            "No usage history in the selected window; no projection possible",
        ));
    }

    let mut rows = Vec::with_capacity(scenarios.len());
    for projection in compare_scenarios(&baselines, &scenarios, inputs.horizon) {
        let total = projection.horizon_total();
        let final_month = projection.final_month();
        rows.push(ScenarioComparison {
            scenario: projection.scenario.name().to_string(),
            monthly_growth_rate: projection.scenario.monthly_growth_rate(),
            horizon_total_credits: round_credits(total),
            horizon_total_cost: rounded_cost_band(total, inputs.price, inputs.variance_pct)?,
            final_month_credits: round_credits(final_month),
            final_month_cost: round_currency(inputs.price.cost_of(final_month)),
        });
    }

    Ok(Json(CompareResponse {
        horizon_months: inputs.horizon.months(),
        credit_price: inputs.price.value(),
        scenarios: rows,
    }))
}

/// Get the executive summary for the window
///
/// GET /api/report?period=30d
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProjectionQueryParams>,
) -> Result<Json<ExecutiveSummary>, ApiError> {
    let window = resolve_window(&params.period, params.end)?;
    let inputs = resolve_inputs(&state, &params)?;
    let scenario = resolve_scenario(&state, &params)?;

    let (summaries, _) = load_summaries(&state, window).await?;
    let summary = executive_summary(
        &summaries,
        inputs.price,
        &scenario,
        inputs.horizon,
        inputs.mode,
        inputs.variance_pct,
    )?;

    Ok(Json(summary))
}
