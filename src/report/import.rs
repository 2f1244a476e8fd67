//! CSV import for raw usage rows and for previously exported daily summaries.

use std::collections::HashMap;
use std::io::Read;

use super::ReportError;
use crate::usage::{
    aggregate_to_vec, parse_usage_date, DailySummary, NormalizedDailyUsage, RawUsageRow,
    RejectedRow, ServiceType, UsageError,
};

/// Columns a summary CSV must carry
pub const REQUIRED_SUMMARY_COLUMNS: [&str; 3] = ["DATE", "SERVICE_TYPE", "TOTAL_CREDITS"];

/// Summaries loaded from CSV plus the rows that could not be used
#[derive(Debug, Clone, Default)]
pub struct ImportedSummaries {
    pub summaries: Vec<DailySummary>,
    pub rejected: Vec<RejectedRow>,
}

/// Raw usage rows loaded from CSV plus the records that could not be decoded
#[derive(Debug, Clone, Default)]
pub struct ImportedUsage {
    pub rows: Vec<RawUsageRow>,
    pub rejected: Vec<RejectedRow>,
}

// Ragged rows and non-numeric cells skip the record; I/O failures still end the read.
fn unreadable(index: usize, err: csv::Error) -> Result<RejectedRow, ReportError> {
    if err.is_io_error() {
        return Err(err.into());
    }
    let error = UsageError::InvalidUsageRecord(err.to_string());
    tracing::warn!(row = index, error = %error, "Skipping unreadable CSV row");
    Ok(RejectedRow { index, error })
}

/// Read raw usage rows (one per billing row) from CSV.
///
/// Column names match [`RawUsageRow`] fields; all measure columns are optional.
/// Records that cannot be decoded are returned in `rejected`.
pub fn read_usage_csv<R: Read>(reader: R) -> Result<ImportedUsage, ReportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();
    let missing: Vec<&str> = ["usage_time", "service"]
        .into_iter()
        .filter(|required| !headers.iter().any(|h| h == required))
        .collect();
    if !missing.is_empty() {
        return Err(ReportError::MissingColumns(missing.join(", ")));
    }
    csv_reader.set_headers(csv::StringRecord::from(headers));

    let mut imported = ImportedUsage::default();
    for (index, record) in csv_reader.deserialize().enumerate() {
        match record {
            Ok(row) => imported.rows.push(row),
            Err(err) => imported.rejected.push(unreadable(index, err)?),
        }
    }
    Ok(imported)
}

/// Read daily summaries from a CSV export.
///
/// Headers are matched case-insensitively. `DATE` (or `USAGE_DATE`),
/// `SERVICE_TYPE` and `TOTAL_CREDITS` are required; operation and user
/// counts are optional. Rows sharing a date and service are re-aggregated
/// and the ratio columns are recomputed rather than trusted.
pub fn read_summary_csv<R: Read>(reader: R) -> Result<ImportedSummaries, ReportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns: HashMap<String, usize> = csv_reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_uppercase(), i))
        .collect();

    let find = |names: &[&str]| names.iter().find_map(|n| columns.get(*n).copied());
    let date_col = find(&["DATE", "USAGE_DATE"]);
    let service_col = find(&["SERVICE_TYPE"]);
    let credits_col = find(&["TOTAL_CREDITS"]);
    let operations_col = find(&["TOTAL_OPERATIONS"]);
    let users_col = find(&["DAILY_UNIQUE_USERS", "DAILY_UNIQUE_ACTORS"]);

    let (Some(date_col), Some(service_col), Some(credits_col)) =
        (date_col, service_col, credits_col)
    else {
        let missing: Vec<&str> = REQUIRED_SUMMARY_COLUMNS
            .into_iter()
            .zip([date_col, service_col, credits_col])
            .filter(|(_, col)| col.is_none())
            .map(|(name, _)| name)
            .collect();
        return Err(ReportError::MissingColumns(missing.join(", ")));
    };

    let mut records = Vec::new();
    let mut rejected = Vec::new();

    for (index, record) in csv_reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                rejected.push(unreadable(index, err)?);
                continue;
            }
        };
        let field = |col: usize| record.get(col).unwrap_or("");

        match parse_summary_record(
            field(date_col),
            field(service_col),
            field(credits_col),
            operations_col.map(field),
            users_col.map(field),
        ) {
            Ok(normalized) => records.push(normalized),
            Err(error) => {
                tracing::warn!(row = index, error = %error, "Skipping summary CSV row");
                rejected.push(RejectedRow { index, error });
            }
        }
    }

    Ok(ImportedSummaries {
        summaries: aggregate_to_vec(&records),
        rejected,
    })
}

fn parse_summary_record(
    date: &str,
    service: &str,
    credits: &str,
    operations: Option<&str>,
    users: Option<&str>,
) -> Result<NormalizedDailyUsage, UsageError> {
    let service_type = ServiceType::parse(service)
        .ok_or_else(|| UsageError::UnknownServiceType(service.to_string()))?;
    let usage_date = parse_usage_date(date)
        .ok_or_else(|| UsageError::InvalidUsageRecord(format!("unparseable date '{}'", date)))?;

    let credit_amount: f64 = credits.parse().map_err(|_| {
        UsageError::InvalidUsageRecord(format!("unparseable credits '{}'", credits))
    })?;
    if !credit_amount.is_finite() || credit_amount < 0.0 {
        return Err(UsageError::InvalidUsageRecord(format!(
            "credit amount must be a non-negative number, got {}",
            credit_amount
        )));
    }

    Ok(NormalizedDailyUsage {
        usage_date,
        service_type,
        operation_count: parse_count(operations, "TOTAL_OPERATIONS")?,
        credit_amount,
        unique_actor_count: parse_count(users, "DAILY_UNIQUE_USERS")?,
    })
}

// Counts may arrive as "3" or "3.0" depending on the spreadsheet that wrote them.
fn parse_count(value: Option<&str>, column: &str) -> Result<u64, UsageError> {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return Ok(0);
    };

    let parsed: f64 = raw.parse().map_err(|_| {
        UsageError::InvalidUsageRecord(format!("unparseable {} '{}'", column, raw))
    })?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(UsageError::InvalidUsageRecord(format!(
            "{} must not be negative, got {}",
            column, raw
        )));
    }
    Ok(parsed.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{export_rows, to_csv_bytes, CreditPrice};
    use chrono::NaiveDate;

    #[test]
    fn test_summary_csv_case_insensitive_headers() {
        let data = "date,Service_Type,total_credits,TOTAL_OPERATIONS,daily_unique_users\n\
                    2025-01-01,cortex_analyst,10,4,2\n\
                    2025-01-01,Cortex Analyst,5,2,1\n\
                    2025-01-02,cortex_search,7.5,,\n";

        let imported = read_summary_csv(data.as_bytes()).unwrap();
        assert!(imported.rejected.is_empty());
        assert_eq!(imported.summaries.len(), 2);

        let analyst = &imported.summaries[0];
        assert_eq!(analyst.total_credits, 15.0);
        assert_eq!(analyst.daily_unique_actors, 3);
        assert_eq!(analyst.credits_per_actor, 5.0);
        assert_eq!(imported.summaries[1].total_operations, 0);
    }

    #[test]
    fn test_summary_csv_missing_columns() {
        let data = "DATE,CREDITS\n2025-01-01,1\n";
        match read_summary_csv(data.as_bytes()) {
            Err(ReportError::MissingColumns(cols)) => {
                assert_eq!(cols, "SERVICE_TYPE, TOTAL_CREDITS")
            }
            other => panic!("unexpected result: {:?}", other.map(|i| i.summaries.len())),
        }
    }

    #[test]
    fn test_summary_csv_rejects_bad_rows() {
        let data = "DATE,SERVICE_TYPE,TOTAL_CREDITS\n\
                    2025-01-01,cortex_analyst,-1\n\
                    2025-01-01,quantum,1\n\
                    2025-01-01,cortex_analyst,2\n";
        let imported = read_summary_csv(data.as_bytes()).unwrap();
        assert_eq!(imported.summaries.len(), 1);
        assert_eq!(imported.rejected.len(), 2);
        assert!(matches!(
            imported.rejected[1].error,
            UsageError::UnknownServiceType(_)
        ));
    }

    #[test]
    fn test_summary_csv_skips_ragged_rows() {
        let data = "DATE,SERVICE_TYPE,TOTAL_CREDITS\n\
                    2025-01-01,cortex_analyst,2\n\
                    2025-01-01,cortex_analyst\n\
                    2025-01-02,cortex_analyst,3,99\n\
                    2025-01-03,cortex_analyst,4\n";
        let imported = read_summary_csv(data.as_bytes()).unwrap();
        assert_eq!(imported.summaries.len(), 2);
        assert_eq!(imported.rejected.len(), 2);
        assert_eq!(imported.rejected[0].index, 1);
        assert!(matches!(
            imported.rejected[0].error,
            UsageError::InvalidUsageRecord(_)
        ));
    }

    #[test]
    fn test_export_can_be_reimported() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        let original = vec![DailySummary::from_totals(date, ServiceType::DocumentAi, 12, 6.0, 3)];
        let bytes = to_csv_bytes(&export_rows(&original, CreditPrice::default())).unwrap();

        let imported = read_summary_csv(bytes.as_slice()).unwrap();
        assert_eq!(imported.summaries, original);
    }

    #[test]
    fn test_usage_csv_optional_columns() {
        let data = "usage_time,SERVICE,credits,message_count,unique_users\n\
                    2025-01-01 10:00:00,cortex_analyst,1.25,8,2\n\
                    2025-01-01 11:00:00,cortex_search,,,\n";
        let imported = read_usage_csv(data.as_bytes()).unwrap();
        assert!(imported.rejected.is_empty());

        let rows = &imported.rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].credits, Some(1.25));
        assert_eq!(rows[0].message_count, Some(8));
        assert_eq!(rows[0].page_count, None);
        assert_eq!(rows[1].credits, None);
    }

    #[test]
    fn test_usage_csv_skips_malformed_cells() {
        let data = "usage_time,service,credits\n\
                    2025-01-01 10:00:00,cortex_analyst,1.5\n\
                    2025-01-01 11:00:00,cortex_analyst,n/a\n\
                    2025-01-01 12:00:00,cortex_search,2\n";
        let imported = read_usage_csv(data.as_bytes()).unwrap();

        assert_eq!(imported.rows.len(), 2);
        assert_eq!(imported.rows[1].service, "cortex_search");
        assert_eq!(imported.rejected.len(), 1);
        assert_eq!(imported.rejected[0].index, 1);
        assert!(matches!(
            imported.rejected[0].error,
            UsageError::InvalidUsageRecord(_)
        ));
    }

    #[test]
    fn test_usage_csv_requires_time_and_service() {
        let data = "credits\n1.0\n";
        assert!(matches!(
            read_usage_csv(data.as_bytes()),
            Err(ReportError::MissingColumns(_))
        ));
    }
}
