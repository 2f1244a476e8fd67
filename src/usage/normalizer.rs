//! Reshapes heterogeneous per-service usage rows into one common record.
//!
//! Each service family reports different measures (messages, pages, queries,
//! training jobs). The normalizer picks the column that counts as an
//! "operation" for that family and defaults anything the family lacks to 0,
//! so the aggregator never has to branch on missing values. It does not
//! aggregate across time; one raw row yields one normalized record.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::{ServiceType, UsageError};

/// A single raw usage row as exported by the billing data source
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct RawUsageRow {
    /// Usage bucket start: a date, a `YYYY-MM-DD HH:MM:SS` timestamp or RFC 3339
    pub usage_time: String,
    /// Service family tag
    pub service: String,
    #[serde(default)]
    pub credits: Option<f64>,
    #[serde(default)]
    pub request_count: Option<i64>,
    #[serde(default)]
    pub message_count: Option<i64>,
    #[serde(default)]
    pub token_count: Option<i64>,
    #[serde(default)]
    pub page_count: Option<i64>,
    #[serde(default)]
    pub document_count: Option<i64>,
    #[serde(default)]
    pub query_count: Option<i64>,
    #[serde(default)]
    pub unique_users: Option<i64>,
}

/// Service-agnostic usage for one raw row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedDailyUsage {
    pub usage_date: NaiveDate,
    pub service_type: ServiceType,
    pub operation_count: u64,
    pub credit_amount: f64,
    pub unique_actor_count: u64,
}

/// A row the normalizer refused, with the reason
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// Position of the row in the input batch
    pub index: usize,
    pub error: UsageError,
}

/// Result of normalizing a batch of rows
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<NormalizedDailyUsage>,
    pub rejected: Vec<RejectedRow>,
}

impl NormalizedBatch {
    /// Number of rows rejected as invalid (bad credits, counts or timestamp)
    pub fn invalid_count(&self) -> usize {
        self.rejected
            .iter()
            .filter(|r| matches!(r.error, UsageError::InvalidUsageRecord(_)))
            .count()
    }

    /// Number of rows rejected because the service tag was not recognized
    pub fn unknown_service_count(&self) -> usize {
        self.rejected
            .iter()
            .filter(|r| matches!(r.error, UsageError::UnknownServiceType(_)))
            .count()
    }
}

/// Normalize a single raw row.
pub fn normalize(row: &RawUsageRow) -> Result<NormalizedDailyUsage, UsageError> {
    let service_type = ServiceType::parse(&row.service)
        .ok_or_else(|| UsageError::UnknownServiceType(row.service.clone()))?;

    let usage_date = parse_usage_date(&row.usage_time).ok_or_else(|| {
        UsageError::InvalidUsageRecord(format!("unparseable usage time '{}'", row.usage_time))
    })?;

    let credit_amount = match row.credits {
        Some(c) if c.is_finite() && c >= 0.0 => c,
        Some(c) => {
            return Err(UsageError::InvalidUsageRecord(format!(
                "credit amount must be a non-negative number, got {}",
                c
            )))
        }
        None => {
            return Err(UsageError::InvalidUsageRecord(
                "credit amount is missing".to_string(),
            ))
        }
    };

    let (operation_count, unique_actor_count) = match service_type {
        ServiceType::CortexAnalyst => map_analyst(row)?,
        ServiceType::CortexSearch => map_search(row)?,
        ServiceType::CortexFunctions => map_functions(row)?,
        ServiceType::DocumentAi => map_document_ai(row)?,
        ServiceType::FineTuning => map_fine_tuning(row)?,
    };

    Ok(NormalizedDailyUsage {
        usage_date,
        service_type,
        operation_count,
        credit_amount,
        unique_actor_count,
    })
}

/// Normalize every row of a batch.
///
/// Bad rows never abort the batch: they are collected in
/// [`NormalizedBatch::rejected`] and logged as warnings.
pub fn normalize_batch(rows: &[RawUsageRow]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (index, row) in rows.iter().enumerate() {
        match normalize(row) {
            Ok(record) => batch.records.push(record),
            Err(error) => {
                tracing::warn!(
                    row = index,
                    service = %row.service,
                    usage_time = %row.usage_time,
                    error = %error,
                    "Rejected usage row"
                );
                batch.rejected.push(RejectedRow { index, error });
            }
        }
    }

    batch
}

/// Extract the calendar date from the accepted timestamp formats
pub fn parse_usage_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }

    None
}

fn count(value: Option<i64>, field: &str) -> Result<u64, UsageError> {
    match value {
        None => Ok(0),
        Some(v) if v >= 0 => Ok(v as u64),
        Some(v) => Err(UsageError::InvalidUsageRecord(format!(
            "{} must not be negative, got {}",
            field, v
        ))),
    }
}

fn map_analyst(row: &RawUsageRow) -> Result<(u64, u64), UsageError> {
    let operations = match row.message_count {
        Some(_) => count(row.message_count, "message_count")?,
        None => count(row.request_count, "request_count")?,
    };
    Ok((operations, count(row.unique_users, "unique_users")?))
}

// Search is billed for continuous serving; there is no per-user notion.
fn map_search(row: &RawUsageRow) -> Result<(u64, u64), UsageError> {
    Ok((count(row.query_count, "query_count")?, 0))
}

fn map_functions(row: &RawUsageRow) -> Result<(u64, u64), UsageError> {
    let operations = match row.request_count {
        Some(_) => count(row.request_count, "request_count")?,
        None => count(row.query_count, "query_count")?,
    };
    Ok((operations, count(row.unique_users, "unique_users")?))
}

fn map_document_ai(row: &RawUsageRow) -> Result<(u64, u64), UsageError> {
    let operations = match row.page_count {
        Some(_) => count(row.page_count, "page_count")?,
        None => count(row.document_count, "document_count")?,
    };
    Ok((operations, count(row.unique_users, "unique_users")?))
}

fn map_fine_tuning(row: &RawUsageRow) -> Result<(u64, u64), UsageError> {
    Ok((count(row.request_count, "request_count")?, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(service: &str, credits: Option<f64>) -> RawUsageRow {
        RawUsageRow {
            usage_time: "2025-01-01".to_string(),
            service: service.to_string(),
            credits,
            ..Default::default()
        }
    }

    #[test]
    fn test_analyst_prefers_message_count() {
        let mut r = row("cortex_analyst", Some(4.5));
        r.message_count = Some(12);
        r.request_count = Some(99);
        r.unique_users = Some(3);

        let n = normalize(&r).unwrap();
        assert_eq!(n.service_type, ServiceType::CortexAnalyst);
        assert_eq!(n.operation_count, 12);
        assert_eq!(n.unique_actor_count, 3);
        assert_eq!(n.credit_amount, 4.5);
    }

    #[test]
    fn test_search_has_no_actors() {
        let mut r = row("Cortex Search", Some(20.0));
        r.unique_users = Some(7);

        let n = normalize(&r).unwrap();
        assert_eq!(n.operation_count, 0);
        assert_eq!(n.unique_actor_count, 0);
    }

    #[test]
    fn test_document_ai_falls_back_to_document_count() {
        let mut r = row("document_ai", Some(1.0));
        r.document_count = Some(5);

        let n = normalize(&r).unwrap();
        assert_eq!(n.operation_count, 5);
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(parse_usage_date("2025-03-09"), Some(expected));
        assert_eq!(parse_usage_date("2025-03-09 23:00:00"), Some(expected));
        assert_eq!(parse_usage_date("2025-03-09 23:00:00.123"), Some(expected));
        assert_eq!(parse_usage_date("2025-03-09T10:15:00Z"), Some(expected));
        assert_eq!(parse_usage_date("09/03/2025"), None);
    }

    #[test]
    fn test_negative_or_missing_credits_rejected() {
        assert!(matches!(
            normalize(&row("analyst", Some(-0.1))),
            Err(UsageError::InvalidUsageRecord(_))
        ));
        assert!(matches!(
            normalize(&row("analyst", None)),
            Err(UsageError::InvalidUsageRecord(_))
        ));
        assert!(matches!(
            normalize(&row("analyst", Some(f64::NAN))),
            Err(UsageError::InvalidUsageRecord(_))
        ));
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut r = row("fine_tuning", Some(1.0));
        r.request_count = Some(-2);
        assert!(matches!(
            normalize(&r),
            Err(UsageError::InvalidUsageRecord(_))
        ));
    }

    #[test]
    fn test_unknown_service_rejected() {
        assert_eq!(
            normalize(&row("warehouse_compute", Some(1.0))),
            Err(UsageError::UnknownServiceType("warehouse_compute".to_string()))
        );
    }

    #[test]
    fn test_batch_skips_bad_rows() {
        let rows = vec![
            row("analyst", Some(1.0)),
            row("mystery", Some(1.0)),
            row("search", Some(-3.0)),
            row("functions", Some(2.0)),
        ];

        let batch = normalize_batch(&rows);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.rejected.len(), 2);
        assert_eq!(batch.unknown_service_count(), 1);
        assert_eq!(batch.invalid_count(), 1);
        assert_eq!(batch.rejected[0].index, 1);
        assert_eq!(batch.rejected[1].index, 2);
    }
}
