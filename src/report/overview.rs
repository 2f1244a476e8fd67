//! Historical overview and executive summary.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::{round_credits, round_currency, CreditPrice};
use crate::engine::{
    project_portfolio, Baseline, BaselineMode, GrowthScenario, Horizon, ProjectionError,
    VarianceBand,
};
use crate::usage::{DailySummary, ServiceType};

/// Per-service slice of the historical overview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceBreakdown {
    pub service_type: ServiceType,
    pub total_credits: f64,
    pub total_cost: f64,
    pub total_operations: u64,
    pub avg_daily_users: f64,
    pub pct_of_total: f64,
}

/// Headline figures over a window of daily summaries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalOverview {
    pub days_of_data: usize,
    pub active_services: usize,
    pub total_credits: f64,
    pub total_cost: f64,
    /// Mean over days of the all-service credit total
    pub avg_daily_credits: f64,
    pub avg_daily_cost: f64,
    /// Mean of per-row actor counts
    pub avg_daily_users: f64,
    /// Sorted by credits, largest first
    pub services: Vec<ServiceBreakdown>,
}

fn sorted_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    values.iter().sum()
}

#[derive(Default)]
struct ServiceAcc {
    credits: Vec<f64>,
    operations: u64,
    actors: u64,
    rows: usize,
}

pub fn historical_overview(summaries: &[DailySummary], price: CreditPrice) -> HistoricalOverview {
    let total_credits = sorted_sum(summaries.iter().map(|s| s.total_credits).collect());

    let mut per_day: BTreeMap<chrono::NaiveDate, Vec<f64>> = BTreeMap::new();
    let mut per_service: BTreeMap<ServiceType, ServiceAcc> = BTreeMap::new();
    for s in summaries {
        per_day.entry(s.usage_date).or_default().push(s.total_credits);

        let acc = per_service.entry(s.service_type).or_default();
        acc.credits.push(s.total_credits);
        acc.operations = acc.operations.saturating_add(s.total_operations);
        acc.actors = acc.actors.saturating_add(s.daily_unique_actors);
        acc.rows += 1;
    }

    let days_of_data = per_day.len();
    let avg_daily_credits = if days_of_data > 0 {
        sorted_sum(per_day.into_values().map(sorted_sum).collect()) / days_of_data as f64
    } else {
        0.0
    };

    let total_actors: u64 = summaries.iter().map(|s| s.daily_unique_actors).sum();
    let avg_daily_users = if summaries.is_empty() {
        0.0
    } else {
        total_actors as f64 / summaries.len() as f64
    };

    let mut services: Vec<ServiceBreakdown> = per_service
        .into_iter()
        .map(|(service_type, acc)| {
            let credits = sorted_sum(acc.credits);
            ServiceBreakdown {
                service_type,
                total_credits: round_credits(credits),
                total_cost: round_currency(price.cost_of(credits)),
                total_operations: acc.operations,
                avg_daily_users: round_credits(acc.actors as f64 / acc.rows as f64),
                pct_of_total: if total_credits > 0.0 {
                    round_credits(credits / total_credits * 100.0)
                } else {
                    0.0
                },
            }
        })
        .collect();
    services.sort_by(|a, b| {
        b.total_credits
            .total_cmp(&a.total_credits)
            .then_with(|| a.service_type.cmp(&b.service_type))
    });

    HistoricalOverview {
        days_of_data,
        active_services: services.len(),
        total_credits: round_credits(total_credits),
        total_cost: round_currency(price.cost_of(total_credits)),
        avg_daily_credits: round_credits(avg_daily_credits),
        avg_daily_cost: round_currency(price.cost_of(avg_daily_credits)),
        avg_daily_users: round_credits(avg_daily_users),
        services,
    }
}

/// Projection block of the executive summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionHeadline {
    pub scenario: String,
    pub monthly_growth_rate: f64,
    pub horizon_months: u32,
    /// Cost summed over months 1..=horizon
    pub projected_total_cost: VarianceBand,
    pub avg_monthly_cost: f64,
    pub final_month_cost: f64,
    /// Services that had no history and were left out of the projection
    pub services_without_baseline: Vec<ServiceType>,
}

/// Current state plus a forward-looking headline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutiveSummary {
    pub credit_price: f64,
    pub overview: HistoricalOverview,
    /// `None` when no service had any history to project from
    pub projection: Option<ProjectionHeadline>,
}

/// Build the executive summary.
///
/// Fails only on invalid parameters. An empty history produces a summary
/// with no projection block rather than a projection of zeros.
pub fn executive_summary(
    summaries: &[DailySummary],
    price: CreditPrice,
    scenario: &GrowthScenario,
    horizon: Horizon,
    mode: BaselineMode,
    variance_pct: f64,
) -> Result<ExecutiveSummary, ProjectionError> {
    // Validate up front so a bad variance fails even on empty input.
    VarianceBand::new(0.0, variance_pct)?;

    let overview = historical_overview(summaries, price);

    let mut baselines = Vec::new();
    let mut services_without_baseline = Vec::new();
    let present: BTreeSet<ServiceType> = summaries.iter().map(|s| s.service_type).collect();
    for service in ServiceType::ALL {
        match Baseline::from_history(service, summaries, mode) {
            Ok(baseline) => baselines.push(baseline),
            Err(ProjectionError::EmptyBaseline(_)) => {
                if !present.is_empty() {
                    services_without_baseline.push(service);
                }
            }
            Err(e) => return Err(e),
        }
    }

    let projection = if baselines.is_empty() {
        None
    } else {
        let result = project_portfolio(&baselines, scenario, horizon);
        let total_cost = price.cost_of(result.horizon_total());
        let band = VarianceBand::new(total_cost, variance_pct)?;

        Some(ProjectionHeadline {
            scenario: scenario.name().to_string(),
            monthly_growth_rate: scenario.monthly_growth_rate(),
            horizon_months: horizon.months(),
            projected_total_cost: VarianceBand {
                lower: round_currency(band.lower),
                expected: round_currency(band.expected),
                upper: round_currency(band.upper),
            },
            avg_monthly_cost: round_currency(total_cost / horizon.months() as f64),
            final_month_cost: round_currency(price.cost_of(result.final_month())),
            services_without_baseline,
        })
    };

    Ok(ExecutiveSummary {
        credit_price: price.value(),
        overview,
        projection,
    })
}
