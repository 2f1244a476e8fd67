//! Flat export rows and CSV writing.

use serde::Serialize;
use std::io::Write;

use super::{round_credits, round_currency, CreditPrice, ReportError};
use crate::engine::{ScenarioProjection, VarianceBand, DAYS_PER_MONTH};
use crate::usage::DailySummary;

/// A row type with a fixed CSV header
pub trait CsvRecord: Serialize {
    const HEADERS: &'static [&'static str];
}

/// Daily usage export row. Column order and names are consumed by
/// downstream spreadsheets and must not change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub date: String,
    pub service_type: String,
    pub daily_unique_users: u64,
    pub total_operations: u64,
    pub total_credits: f64,
    pub credits_per_user: f64,
    pub credits_per_operation: f64,
    pub avg_daily_cost_per_user: f64,
    pub projected_monthly_cost_per_user: f64,
    pub projected_monthly_total_credits: f64,
}

impl CsvRecord for ExportRow {
    const HEADERS: &'static [&'static str] = &[
        "date",
        "service_type",
        "daily_unique_users",
        "total_operations",
        "total_credits",
        "credits_per_user",
        "credits_per_operation",
        "avg_daily_cost_per_user",
        "projected_monthly_cost_per_user",
        "projected_monthly_total_credits",
    ];
}

impl ExportRow {
    pub fn from_summary(summary: &DailySummary, price: CreditPrice) -> Self {
        let cost_per_user = price.cost_of(summary.credits_per_actor);

        Self {
            date: summary.usage_date.format("%Y-%m-%d").to_string(),
            service_type: summary.service_type.as_str().to_string(),
            daily_unique_users: summary.daily_unique_actors,
            total_operations: summary.total_operations,
            total_credits: round_credits(summary.total_credits),
            credits_per_user: round_credits(summary.credits_per_actor),
            credits_per_operation: round_credits(summary.credits_per_operation),
            avg_daily_cost_per_user: round_currency(cost_per_user),
            projected_monthly_cost_per_user: round_currency(cost_per_user * DAYS_PER_MONTH),
            projected_monthly_total_credits: round_credits(summary.total_credits * DAYS_PER_MONTH),
        }
    }
}

/// Export rows for a set of summaries, newest date first then by service
pub fn export_rows(summaries: &[DailySummary], price: CreditPrice) -> Vec<ExportRow> {
    let mut sorted: Vec<&DailySummary> = summaries.iter().collect();
    sorted.sort_by(|a, b| {
        b.usage_date
            .cmp(&a.usage_date)
            .then_with(|| a.service_type.as_str().cmp(b.service_type.as_str()))
    });
    sorted
        .into_iter()
        .map(|s| ExportRow::from_summary(s, price))
        .collect()
}

/// Projection export row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionExportRow {
    pub scenario: String,
    pub month_index: u32,
    pub service_type: String,
    pub projected_credits: f64,
    pub projected_cost: f64,
    pub lower_bound_cost: f64,
    pub upper_bound_cost: f64,
}

impl CsvRecord for ProjectionExportRow {
    const HEADERS: &'static [&'static str] = &[
        "scenario",
        "month_index",
        "service_type",
        "projected_credits",
        "projected_cost",
        "lower_bound_cost",
        "upper_bound_cost",
    ];
}

/// Flatten a projection into per-service, per-month rows plus an `all`
/// row per month carrying the cross-service total
pub fn projection_rows(
    projection: &ScenarioProjection,
    price: CreditPrice,
    variance_pct: f64,
) -> Result<Vec<ProjectionExportRow>, crate::engine::ProjectionError> {
    let scenario = projection.scenario.name().to_string();
    let mut rows = Vec::with_capacity(projection.points.len() + projection.monthly_totals.len());

    let mut points: Vec<_> = projection.points.iter().collect();
    points.sort_by_key(|p| (p.month_index, p.service_type));

    for point in points {
        let band = VarianceBand::new(price.cost_of(point.projected_credits), variance_pct)?;
        rows.push(ProjectionExportRow {
            scenario: scenario.clone(),
            month_index: point.month_index,
            service_type: point.service_type.as_str().to_string(),
            projected_credits: round_credits(point.projected_credits),
            projected_cost: round_currency(band.expected),
            lower_bound_cost: round_currency(band.lower),
            upper_bound_cost: round_currency(band.upper),
        });
    }

    for total in &projection.monthly_totals {
        let band = VarianceBand::new(price.cost_of(total.projected_credits), variance_pct)?;
        rows.push(ProjectionExportRow {
            scenario: scenario.clone(),
            month_index: total.month_index,
            service_type: "all".to_string(),
            projected_credits: round_credits(total.projected_credits),
            projected_cost: round_currency(band.expected),
            lower_bound_cost: round_currency(band.lower),
            upper_bound_cost: round_currency(band.upper),
        });
    }

    Ok(rows)
}

/// Write rows as CSV with the row type's header, even when `rows` is empty
pub fn write_csv<W: Write, T: CsvRecord>(writer: W, rows: &[T]) -> Result<(), ReportError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    csv_writer.write_record(T::HEADERS)?;
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Render rows to an in-memory CSV buffer
pub fn to_csv_bytes<T: CsvRecord>(rows: &[T]) -> Result<Vec<u8>, ReportError> {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, rows)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{project_portfolio, Baseline, GrowthScenario, Horizon};
    use crate::usage::ServiceType;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_export_row_values() {
        let summary =
            DailySummary::from_totals(date("2025-01-01"), ServiceType::CortexAnalyst, 6, 15.0, 3);
        let row = ExportRow::from_summary(&summary, CreditPrice::default());

        assert_eq!(row.date, "2025-01-01");
        assert_eq!(row.service_type, "cortex_analyst");
        assert_eq!(row.daily_unique_users, 3);
        assert_eq!(row.credits_per_user, 5.0);
        assert_eq!(row.credits_per_operation, 2.5);
        assert_eq!(row.avg_daily_cost_per_user, 15.0);
        assert_eq!(row.projected_monthly_cost_per_user, 450.0);
        assert_eq!(row.projected_monthly_total_credits, 450.0);
    }

    #[test]
    fn test_export_rows_order() {
        let summaries = vec![
            DailySummary::from_totals(date("2025-01-01"), ServiceType::DocumentAi, 1, 1.0, 1),
            DailySummary::from_totals(date("2025-01-02"), ServiceType::FineTuning, 1, 1.0, 0),
            DailySummary::from_totals(date("2025-01-02"), ServiceType::CortexSearch, 1, 1.0, 0),
        ];
        let rows = export_rows(&summaries, CreditPrice::default());
        let order: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.date.as_str(), r.service_type.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2025-01-02", "cortex_search"),
                ("2025-01-02", "fine_tuning"),
                ("2025-01-01", "document_ai"),
            ]
        );
    }

    #[test]
    fn test_csv_header_order() {
        let summary =
            DailySummary::from_totals(date("2025-01-01"), ServiceType::CortexSearch, 0, 1.23456, 0);
        let bytes = to_csv_bytes(&export_rows(&[summary], CreditPrice::default())).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "date,service_type,daily_unique_users,total_operations,total_credits,credits_per_user,credits_per_operation,avg_daily_cost_per_user,projected_monthly_cost_per_user,projected_monthly_total_credits"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2025-01-01,cortex_search,0,0,1.2346,0.0,0.0,0.0,0.0,37.0368"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_empty_export_still_has_header() {
        let bytes = to_csv_bytes::<ExportRow>(&[]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("date,service_type,"));
    }

    #[test]
    fn test_projection_rows_include_totals() {
        let baselines = vec![
            Baseline::from_monthly_credits(ServiceType::CortexAnalyst, 100.0),
            Baseline::from_monthly_credits(ServiceType::CortexSearch, 50.0),
        ];
        let projection = project_portfolio(
            &baselines,
            &GrowthScenario::conservative(),
            Horizon::new(1).unwrap(),
        );
        let rows = projection_rows(&projection, CreditPrice::default(), 0.1).unwrap();

        assert_eq!(rows.len(), 6);
        let total_m1 = rows
            .iter()
            .find(|r| r.service_type == "all" && r.month_index == 1)
            .unwrap();
        assert_eq!(total_m1.projected_credits, 165.0);
        assert_eq!(total_m1.projected_cost, 495.0);
        assert_eq!(total_m1.lower_bound_cost, 445.5);
        assert_eq!(total_m1.upper_bound_cost, 544.5);
    }
}
