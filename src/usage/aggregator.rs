//! Daily rollup of normalized usage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{NormalizedDailyUsage, ServiceType};

/// Grouping key for daily summaries
pub type SummaryKey = (NaiveDate, ServiceType);

/// Per-day, per-service usage totals with derived ratios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub usage_date: NaiveDate,
    pub service_type: ServiceType,
    pub total_operations: u64,
    pub total_credits: f64,
    /// Sum of per-record actor counts; not de-duplicated across records
    pub daily_unique_actors: u64,
    pub credits_per_actor: f64,
    pub credits_per_operation: f64,
}

impl DailySummary {
    /// Build a summary from group totals, deriving both ratios.
    ///
    /// A zero denominator yields a ratio of 0 so reports always render.
    pub fn from_totals(
        usage_date: NaiveDate,
        service_type: ServiceType,
        total_operations: u64,
        total_credits: f64,
        daily_unique_actors: u64,
    ) -> Self {
        Self {
            usage_date,
            service_type,
            total_operations,
            total_credits,
            daily_unique_actors,
            credits_per_actor: safe_ratio(total_credits, daily_unique_actors),
            credits_per_operation: safe_ratio(total_credits, total_operations),
        }
    }

    pub fn key(&self) -> SummaryKey {
        (self.usage_date, self.service_type)
    }
}

fn safe_ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

#[derive(Default)]
struct Accumulator {
    operations: u64,
    actors: u64,
    credits: Vec<f64>,
}

/// Group normalized records by `(usage_date, service_type)`.
///
/// Ratios are derived from the group totals, never averaged per record.
/// Credits are summed in sorted order so the result is bit-identical for any
/// permutation of the input.
pub fn aggregate(records: &[NormalizedDailyUsage]) -> BTreeMap<SummaryKey, DailySummary> {
    let mut groups: BTreeMap<SummaryKey, Accumulator> = BTreeMap::new();

    for record in records {
        let acc = groups
            .entry((record.usage_date, record.service_type))
            .or_default();
        acc.operations = acc.operations.saturating_add(record.operation_count);
        acc.actors = acc.actors.saturating_add(record.unique_actor_count);
        acc.credits.push(record.credit_amount);
    }

    groups
        .into_iter()
        .map(|((date, service), mut acc)| {
            acc.credits.sort_by(|a, b| a.total_cmp(b));
            let total_credits: f64 = acc.credits.iter().sum();
            let summary =
                DailySummary::from_totals(date, service, acc.operations, total_credits, acc.actors);
            ((date, service), summary)
        })
        .collect()
}

/// Same as [`aggregate`], flattened into a list ordered by date then service
pub fn aggregate_to_vec(records: &[NormalizedDailyUsage]) -> Vec<DailySummary> {
    aggregate(records).into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::{normalize_batch, RawUsageRow};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record(
        d: &str,
        service: ServiceType,
        ops: u64,
        credits: f64,
        actors: u64,
    ) -> NormalizedDailyUsage {
        NormalizedDailyUsage {
            usage_date: date(d),
            service_type: service,
            operation_count: ops,
            credit_amount: credits,
            unique_actor_count: actors,
        }
    }

    #[test]
    fn test_two_rows_same_day_are_summed() {
        let rows = vec![
            RawUsageRow {
                usage_time: "2025-01-01".to_string(),
                service: "cortex_analyst".to_string(),
                credits: Some(10.0),
                unique_users: Some(2),
                ..Default::default()
            },
            RawUsageRow {
                usage_time: "2025-01-01".to_string(),
                service: "cortex_analyst".to_string(),
                credits: Some(5.0),
                unique_users: Some(1),
                ..Default::default()
            },
        ];

        let batch = normalize_batch(&rows);
        let summaries = aggregate_to_vec(&batch.records);

        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.usage_date, date("2025-01-01"));
        assert_eq!(s.service_type, ServiceType::CortexAnalyst);
        assert_eq!(s.total_credits, 15.0);
        assert_eq!(s.daily_unique_actors, 3);
        assert_eq!(s.credits_per_actor, 5.0);
    }

    #[test]
    fn test_zero_denominators_give_zero_ratios() {
        let summaries =
            aggregate_to_vec(&[record("2025-01-02", ServiceType::CortexSearch, 0, 42.0, 0)]);
        let s = &summaries[0];
        assert_eq!(s.credits_per_actor, 0.0);
        assert_eq!(s.credits_per_operation, 0.0);
        assert!(s.credits_per_actor.is_finite());
    }

    #[test]
    fn test_ratios_use_group_totals() {
        // Per-record averages would give (10/1 + 2/9) / 2 = 5.11
        let summaries = aggregate_to_vec(&[
            record("2025-01-03", ServiceType::CortexFunctions, 1, 10.0, 1),
            record("2025-01-03", ServiceType::CortexFunctions, 9, 2.0, 9),
        ]);
        let s = &summaries[0];
        assert!((s.credits_per_operation - 1.2).abs() < 1e-12);
        assert!((s.credits_per_actor - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_aggregation_is_order_independent() {
        let mut records = vec![
            record("2025-01-01", ServiceType::CortexAnalyst, 3, 0.1, 1),
            record("2025-01-01", ServiceType::CortexAnalyst, 5, 0.2, 2),
            record("2025-01-01", ServiceType::CortexAnalyst, 7, 0.3, 1),
            record("2025-01-02", ServiceType::DocumentAi, 40, 1e16, 4),
            record("2025-01-02", ServiceType::DocumentAi, 2, 1.0, 1),
            record("2025-01-02", ServiceType::DocumentAi, 2, -0.0, 0),
            record("2025-01-01", ServiceType::FineTuning, 1, 12.5, 0),
        ];

        let expected = aggregate(&records);
        for _ in 0..records.len() {
            records.rotate_left(1);
            assert_eq!(aggregate(&records), expected);
        }
        records.reverse();
        assert_eq!(aggregate(&records), expected);
    }

    #[test]
    fn test_output_is_ordered_by_date_then_service() {
        let summaries = aggregate_to_vec(&[
            record("2025-01-02", ServiceType::CortexAnalyst, 1, 1.0, 1),
            record("2025-01-01", ServiceType::FineTuning, 1, 1.0, 0),
            record("2025-01-01", ServiceType::CortexAnalyst, 1, 1.0, 1),
        ]);
        let keys: Vec<_> = summaries.iter().map(|s| s.key()).collect();
        assert_eq!(
            keys,
            vec![
                (date("2025-01-01"), ServiceType::CortexAnalyst),
                (date("2025-01-01"), ServiceType::FineTuning),
                (date("2025-01-02"), ServiceType::CortexAnalyst),
            ]
        );
    }
}
