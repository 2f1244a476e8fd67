//! Daily snapshot models for historical usage summaries.
//!
//! Each run of the snapshot job stores the daily summaries it computed under
//! the date the job ran (`snapshot_date`). Readers always see, for a given
//! usage date, the summary from the most recent snapshot that covered it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::usage::{DailySummary, ServiceType};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Stored daily snapshot row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailySnapshot {
    pub snapshot_date: String,
    pub service_type: String,
    pub usage_date: String,
    pub total_operations: i64,
    pub total_credits: f64,
    pub daily_unique_actors: i64,
    pub credits_per_actor: f64,
    pub credits_per_operation: f64,
}

impl DailySnapshot {
    /// Convert back into a summary; `None` if the row holds values this
    /// version cannot interpret.
    pub fn into_summary(self) -> Option<DailySummary> {
        let usage_date = NaiveDate::parse_from_str(&self.usage_date, DATE_FORMAT).ok()?;
        let service_type = ServiceType::parse(&self.service_type)?;

        Some(DailySummary {
            usage_date,
            service_type,
            total_operations: u64::try_from(self.total_operations).ok()?,
            total_credits: self.total_credits,
            daily_unique_actors: u64::try_from(self.daily_unique_actors).ok()?,
            credits_per_actor: self.credits_per_actor,
            credits_per_operation: self.credits_per_operation,
        })
    }

    /// Insert or update a snapshot (upsert on snapshot_date + service_type + usage_date)
    pub async fn upsert(
        db: &SqlitePool,
        summary: &DailySummary,
        snapshot_date: NaiveDate,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO daily_snapshots (
                snapshot_date, service_type, usage_date, total_operations, total_credits,
                daily_unique_actors, credits_per_actor, credits_per_operation
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(snapshot_date, service_type, usage_date) DO UPDATE SET
                total_operations = excluded.total_operations,
                total_credits = excluded.total_credits,
                daily_unique_actors = excluded.daily_unique_actors,
                credits_per_actor = excluded.credits_per_actor,
                credits_per_operation = excluded.credits_per_operation
            "#,
        )
        .bind(snapshot_date.format(DATE_FORMAT).to_string())
        .bind(summary.service_type.as_str())
        .bind(summary.usage_date.format(DATE_FORMAT).to_string())
        .bind(clamp_i64(summary.total_operations))
        .bind(summary.total_credits)
        .bind(clamp_i64(summary.daily_unique_actors))
        .bind(summary.credits_per_actor)
        .bind(summary.credits_per_operation)
        .execute(db)
        .await?;

        Ok(())
    }

    /// Latest snapshot of each usage date within `[start, end]` for a service,
    /// ordered by usage date
    pub async fn get_window(
        db: &SqlitePool,
        service_type: ServiceType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailySnapshot>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT s.snapshot_date, s.service_type, s.usage_date, s.total_operations,
                   s.total_credits, s.daily_unique_actors, s.credits_per_actor,
                   s.credits_per_operation
            FROM daily_snapshots s
            WHERE s.service_type = ? AND s.usage_date >= ? AND s.usage_date <= ?
              AND s.snapshot_date = (
                  SELECT MAX(i.snapshot_date)
                  FROM daily_snapshots i
                  WHERE i.service_type = s.service_type AND i.usage_date = s.usage_date
              )
            ORDER BY s.usage_date ASC
            "#,
        )
        .bind(service_type.as_str())
        .bind(start.format(DATE_FORMAT).to_string())
        .bind(end.format(DATE_FORMAT).to_string())
        .fetch_all(db)
        .await
    }

    /// Latest snapshot of one usage date for a service
    pub async fn get_for_date(
        db: &SqlitePool,
        service_type: ServiceType,
        usage_date: NaiveDate,
    ) -> Result<Option<DailySnapshot>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT snapshot_date, service_type, usage_date, total_operations,
                   total_credits, daily_unique_actors, credits_per_actor,
                   credits_per_operation
            FROM daily_snapshots
            WHERE service_type = ? AND usage_date = ?
            ORDER BY snapshot_date DESC
            LIMIT 1
            "#,
        )
        .bind(service_type.as_str())
        .bind(usage_date.format(DATE_FORMAT).to_string())
        .fetch_optional(db)
        .await
    }

    /// Delete snapshots taken before `cutoff` (retention policy)
    pub async fn cleanup_before(db: &SqlitePool, cutoff: NaiveDate) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM daily_snapshots WHERE snapshot_date < ?")
            .bind(cutoff.format(DATE_FORMAT).to_string())
            .execute(db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Number of stored snapshot rows
    pub async fn count(db: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM daily_snapshots")
            .fetch_one(db)
            .await
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_summary_rejects_unknown_service() {
        let row = DailySnapshot {
            snapshot_date: "2025-01-02".to_string(),
            service_type: "warehouse".to_string(),
            usage_date: "2025-01-01".to_string(),
            total_operations: 1,
            total_credits: 1.0,
            daily_unique_actors: 1,
            credits_per_actor: 1.0,
            credits_per_operation: 1.0,
        };
        assert!(row.into_summary().is_none());
    }

    #[test]
    fn test_into_summary_converts_fields() {
        let row = DailySnapshot {
            snapshot_date: "2025-01-02".to_string(),
            service_type: "cortex_functions".to_string(),
            usage_date: "2025-01-01".to_string(),
            total_operations: 8,
            total_credits: 4.0,
            daily_unique_actors: 2,
            credits_per_actor: 2.0,
            credits_per_operation: 0.5,
        };
        let summary = row.into_summary().unwrap();
        assert_eq!(summary.service_type, ServiceType::CortexFunctions);
        assert_eq!(summary.total_operations, 8);
        assert_eq!(summary.credits_per_operation, 0.5);
    }
}
