//! Credit estimate summary for pricing conversations.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{round_credits, round_currency, CreditPrice, CsvRecord};
use crate::engine::DAYS_PER_MONTH;
use crate::usage::{DailySummary, ServiceType};

/// Per-service monthly credit estimate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditEstimateRow {
    #[serde(rename = "Service")]
    pub service: String,
    #[serde(rename = "Total Credits")]
    pub total_credits: f64,
    #[serde(rename = "Avg Credits/Day")]
    pub avg_credits_per_day: f64,
    #[serde(rename = "Est. Credits/Month")]
    pub est_credits_per_month: f64,
    #[serde(rename = "Est. Cost/Month")]
    pub est_cost_per_month: f64,
}

impl CsvRecord for CreditEstimateRow {
    const HEADERS: &'static [&'static str] = &[
        "Service",
        "Total Credits",
        "Avg Credits/Day",
        "Est. Credits/Month",
        "Est. Cost/Month",
    ];
}

struct Span {
    credits: Vec<f64>,
    first: NaiveDate,
    last: NaiveDate,
}

/// Build the estimate table, one row per service in service order.
///
/// Days of data span first to last observed date inclusive, so quiet days in
/// between still count toward the daily average.
pub fn credit_estimate(summaries: &[DailySummary], price: CreditPrice) -> Vec<CreditEstimateRow> {
    let mut spans: BTreeMap<ServiceType, Span> = BTreeMap::new();

    for s in summaries {
        let span = spans.entry(s.service_type).or_insert(Span {
            credits: Vec::new(),
            first: s.usage_date,
            last: s.usage_date,
        });
        span.credits.push(s.total_credits);
        span.first = span.first.min(s.usage_date);
        span.last = span.last.max(s.usage_date);
    }

    spans
        .into_iter()
        .map(|(service, mut span)| {
            span.credits.sort_by(|a, b| a.total_cmp(b));
            let total: f64 = span.credits.iter().sum();
            let days = (span.last - span.first).num_days() + 1;
            let per_day = total / days as f64;
            let per_month = per_day * DAYS_PER_MONTH;

            CreditEstimateRow {
                service: service.display_name().to_string(),
                total_credits: round_credits(total),
                avg_credits_per_day: round_credits(per_day),
                est_credits_per_month: round_credits(per_month),
                est_cost_per_month: round_currency(price.cost_of(per_month)),
            }
        })
        .collect()
}
