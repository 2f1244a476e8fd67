//! Cost projection engine
//!
//! Extrapolates monthly credit consumption from a baseline using compound
//! month-over-month growth:
//!
//! ```text
//! projected_credits(m) = C0 * (1 + rate)^m      m = 0..=horizon
//! ```
//!
//! Month 0 is the baseline month itself. When several services are projected
//! together, each one compounds from its own baseline with its own rate and
//! the results are summed per month; rates are never averaged.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::usage::{DailySummary, ServiceType};

/// Days per month used to scale a daily baseline
pub const DAYS_PER_MONTH: f64 = 30.0;

/// Errors from projection requests
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("Invalid growth rate {0}: must be a finite number greater than -1.0")]
    InvalidGrowthRate(f64),

    #[error("Invalid projection horizon: {0}")]
    InvalidHorizon(String),

    #[error("No usage history for {0}; no projection possible")]
    EmptyBaseline(ServiceType),

    #[error("Invalid variance {0}: must be at least 0 and below 1")]
    InvalidVariance(f64),
}

/// A named monthly compounding rate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthScenario {
    name: String,
    monthly_growth_rate: f64,
}

impl GrowthScenario {
    pub fn conservative() -> Self {
        Self::preset_unchecked("Conservative", 0.10)
    }

    pub fn moderate() -> Self {
        Self::preset_unchecked("Moderate", 0.25)
    }

    pub fn aggressive() -> Self {
        Self::preset_unchecked("Aggressive", 0.50)
    }

    pub fn rapid() -> Self {
        Self::preset_unchecked("Rapid", 1.00)
    }

    fn preset_unchecked(name: &str, rate: f64) -> Self {
        Self {
            name: name.to_string(),
            monthly_growth_rate: rate,
        }
    }

    /// The four predefined scenarios, slowest first
    pub fn presets() -> Vec<GrowthScenario> {
        vec![
            Self::conservative(),
            Self::moderate(),
            Self::aggressive(),
            Self::rapid(),
        ]
    }

    /// Look up a predefined scenario by name (case-insensitive)
    pub fn preset(name: &str) -> Option<Self> {
        Self::presets()
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Build a scenario with an arbitrary rate.
    ///
    /// Zero and negative rates (decline) are allowed; a rate of -1.0 or less
    /// would mean usage vanishes or turns negative and is rejected.
    pub fn custom(
        name: impl Into<String>,
        monthly_growth_rate: f64,
    ) -> Result<Self, ProjectionError> {
        if !monthly_growth_rate.is_finite() || monthly_growth_rate <= -1.0 {
            return Err(ProjectionError::InvalidGrowthRate(monthly_growth_rate));
        }

        Ok(Self {
            name: name.into(),
            monthly_growth_rate,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn monthly_growth_rate(&self) -> f64 {
        self.monthly_growth_rate
    }

    /// Compound growth factor after `months` months
    pub fn factor(&self, months: u32) -> f64 {
        (1.0 + self.monthly_growth_rate).powf(months as f64)
    }
}

/// Number of months to project forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Horizon(u32);

impl Horizon {
    pub const QUARTER: Horizon = Horizon(3);
    pub const HALF_YEAR: Horizon = Horizon(6);
    pub const YEAR: Horizon = Horizon(12);
    pub const TWO_YEARS: Horizon = Horizon(24);

    /// Longest horizon accepted (100 years)
    pub const MAX_MONTHS: u32 = 1200;

    pub fn new(months: u32) -> Result<Self, ProjectionError> {
        if months == 0 {
            return Err(ProjectionError::InvalidHorizon(
                "horizon must be at least one month".to_string(),
            ));
        }
        if months > Self::MAX_MONTHS {
            return Err(ProjectionError::InvalidHorizon(format!(
                "horizon of {} months exceeds the {}-month limit",
                months,
                Self::MAX_MONTHS
            )));
        }
        Ok(Self(months))
    }

    pub fn months(&self) -> u32 {
        self.0
    }
}

/// How a baseline is derived from history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineMode {
    /// Average credits per active day, times 30
    DailyAverage,
    /// The literal credit total of the history window
    MonthlyTotal,
}

impl BaselineMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "daily_average" => Some(BaselineMode::DailyAverage),
            "monthly" | "monthly_total" => Some(BaselineMode::MonthlyTotal),
            _ => None,
        }
    }
}

/// Reference monthly credits a projection compounds from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Baseline {
    pub service_type: ServiceType,
    pub monthly_credits: f64,
    /// Average daily actors over the history, when known
    pub daily_actors: f64,
}

impl Baseline {
    pub fn from_daily_credits(service_type: ServiceType, daily_credits: f64) -> Self {
        Self {
            service_type,
            monthly_credits: daily_credits * DAYS_PER_MONTH,
            daily_actors: 0.0,
        }
    }

    pub fn from_monthly_credits(service_type: ServiceType, monthly_credits: f64) -> Self {
        Self {
            service_type,
            monthly_credits,
            daily_actors: 0.0,
        }
    }

    /// Derive a baseline for `service_type` from historical summaries.
    ///
    /// Summaries for other services are ignored. No history at all is an
    /// error rather than a silent zero baseline.
    pub fn from_history(
        service_type: ServiceType,
        history: &[DailySummary],
        mode: BaselineMode,
    ) -> Result<Self, ProjectionError> {
        let rows: Vec<&DailySummary> = history
            .iter()
            .filter(|s| s.service_type == service_type)
            .collect();

        if rows.is_empty() {
            return Err(ProjectionError::EmptyBaseline(service_type));
        }

        let mut credits: Vec<f64> = rows.iter().map(|s| s.total_credits).collect();
        credits.sort_by(|a, b| a.total_cmp(b));
        let total_credits: f64 = credits.iter().sum();
        let days: BTreeSet<_> = rows.iter().map(|s| s.usage_date).collect();
        let actors: u64 = rows.iter().map(|s| s.daily_unique_actors).sum();

        let monthly_credits = match mode {
            BaselineMode::DailyAverage => total_credits / days.len() as f64 * DAYS_PER_MONTH,
            BaselineMode::MonthlyTotal => total_credits,
        };

        Ok(Self {
            service_type,
            monthly_credits,
            daily_actors: actors as f64 / rows.len() as f64,
        })
    }

    /// Baselines for every service present in `history`, in service order
    pub fn all_from_history(history: &[DailySummary], mode: BaselineMode) -> Vec<Baseline> {
        let services: BTreeSet<ServiceType> = history.iter().map(|s| s.service_type).collect();
        services
            .into_iter()
            .filter_map(|service| Self::from_history(service, history, mode).ok())
            .collect()
    }
}

/// One projected month for one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionPoint {
    pub month_index: u32,
    pub service_type: ServiceType,
    pub projected_credits: f64,
    pub projected_actors: f64,
}

/// Credits summed across services for one month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
    pub month_index: u32,
    pub projected_credits: f64,
}

/// A scenario's projection over a set of baselines
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioProjection {
    pub scenario: GrowthScenario,
    pub points: Vec<ProjectionPoint>,
    pub monthly_totals: Vec<MonthlyTotal>,
}

impl ScenarioProjection {
    /// Credits summed over months 1..=horizon (the baseline month excluded)
    pub fn horizon_total(&self) -> f64 {
        horizon_total(&self.monthly_totals)
    }

    /// Total credits in the final projected month
    pub fn final_month(&self) -> f64 {
        self.monthly_totals
            .last()
            .map(|t| t.projected_credits)
            .unwrap_or(0.0)
    }
}

/// Project one service's baseline forward
pub fn project(
    baseline: &Baseline,
    scenario: &GrowthScenario,
    horizon: Horizon,
) -> Vec<ProjectionPoint> {
    (0..=horizon.months())
        .map(|month| {
            let factor = scenario.factor(month);
            ProjectionPoint {
                month_index: month,
                service_type: baseline.service_type,
                projected_credits: baseline.monthly_credits * factor,
                projected_actors: baseline.daily_actors * factor,
            }
        })
        .collect()
}

/// Project each service with its own scenario, independently
pub fn project_services(
    inputs: &[(Baseline, GrowthScenario)],
    horizon: Horizon,
) -> Vec<ProjectionPoint> {
    inputs
        .iter()
        .flat_map(|(baseline, scenario)| project(baseline, scenario, horizon))
        .collect()
}

/// Sum projected credits per month across services
pub fn monthly_totals(points: &[ProjectionPoint]) -> Vec<MonthlyTotal> {
    let mut by_month: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for point in points {
        by_month
            .entry(point.month_index)
            .or_default()
            .push(point.projected_credits);
    }

    by_month
        .into_iter()
        .map(|(month_index, mut credits)| {
            credits.sort_by(|a, b| a.total_cmp(b));
            MonthlyTotal {
                month_index,
                projected_credits: credits.iter().sum(),
            }
        })
        .collect()
}

/// Sum of monthly totals for months 1..=horizon
pub fn horizon_total(totals: &[MonthlyTotal]) -> f64 {
    totals
        .iter()
        .filter(|t| t.month_index > 0)
        .map(|t| t.projected_credits)
        .sum()
}

/// Project all baselines under one scenario
pub fn project_portfolio(
    baselines: &[Baseline],
    scenario: &GrowthScenario,
    horizon: Horizon,
) -> ScenarioProjection {
    let inputs: Vec<(Baseline, GrowthScenario)> = baselines
        .iter()
        .map(|b| (b.clone(), scenario.clone()))
        .collect();
    let points = project_services(&inputs, horizon);
    let monthly_totals = monthly_totals(&points);

    ScenarioProjection {
        scenario: scenario.clone(),
        points,
        monthly_totals,
    }
}

/// Run every scenario over the same baselines and horizon
pub fn compare_scenarios(
    baselines: &[Baseline],
    scenarios: &[GrowthScenario],
    horizon: Horizon,
) -> Vec<ScenarioProjection> {
    scenarios
        .iter()
        .map(|scenario| project_portfolio(baselines, scenario, horizon))
        .collect()
}

/// Symmetric uncertainty band around a projected value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VarianceBand {
    pub lower: f64,
    pub expected: f64,
    pub upper: f64,
}

impl VarianceBand {
    pub fn new(expected: f64, variance_pct: f64) -> Result<Self, ProjectionError> {
        if !variance_pct.is_finite() || !(0.0..1.0).contains(&variance_pct) {
            return Err(ProjectionError::InvalidVariance(variance_pct));
        }

        Ok(Self {
            lower: expected * (1.0 - variance_pct),
            expected,
            upper: expected * (1.0 + variance_pct),
        })
    }
}
