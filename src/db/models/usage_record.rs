//! Raw usage record storage.
//!
//! The `usage_records` table is the local copy of the billing data source.
//! Rows are stored exactly as imported; validation happens when they are
//! normalized, so a bad row is reported every time a report touches it
//! instead of disappearing at import time.

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::usage::RawUsageRow;

/// Accessors for the `usage_records` table
pub struct UsageRecord;

impl UsageRecord {
    /// Insert a batch of raw rows in one transaction
    pub async fn insert_many(db: &SqlitePool, rows: &[RawUsageRow]) -> Result<u64, sqlx::Error> {
        let mut tx = db.begin().await?;
        let mut inserted = 0;

        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO usage_records (
                    usage_time, service, credits, request_count, message_count,
                    token_count, page_count, document_count, query_count, unique_users
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.usage_time)
            .bind(&row.service)
            .bind(row.credits)
            .bind(row.request_count)
            .bind(row.message_count)
            .bind(row.token_count)
            .bind(row.page_count)
            .bind(row.document_count)
            .bind(row.query_count)
            .bind(row.unique_users)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Raw rows whose usage date falls within `[start, end]`, oldest first.
    ///
    /// Rows whose date prefix is not a calendar date are returned too, so the
    /// normalizer rejects and counts them instead of the query dropping them.
    pub async fn list_window(
        db: &SqlitePool,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawUsageRow>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT usage_time, service, credits, request_count, message_count,
                   token_count, page_count, document_count, query_count, unique_users
            FROM (
                SELECT *, substr(trim(usage_time), 1, 10) AS day FROM usage_records
            )
            WHERE (day >= ? AND day <= ?) OR date(day) IS NOT day
            ORDER BY usage_time ASC, id ASC
            "#,
        )
        .bind(start.format("%Y-%m-%d").to_string())
        .bind(end.format("%Y-%m-%d").to_string())
        .fetch_all(db)
        .await
    }

    /// Total number of stored rows
    pub async fn count(db: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM usage_records")
            .fetch_one(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;

    fn raw(time: &str, service: &str, credits: f64) -> RawUsageRow {
        RawUsageRow {
            usage_time: time.to_string(),
            service: service.to_string(),
            credits: Some(credits),
            message_count: Some(3),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_and_window_query() {
        let db = init_in_memory().await.unwrap();
        let rows = vec![
            raw("2025-01-01 08:00:00", "cortex_analyst", 1.0),
            raw("2025-01-05T10:00:00Z", "cortex_search", 2.0),
            raw("2025-01-09", "document_ai", 3.0),
        ];

        let inserted = UsageRecord::insert_many(&db, &rows).await.unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(UsageRecord::count(&db).await.unwrap(), 3);

        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        let window = UsageRecord::list_window(&db, start, end).await.unwrap();

        assert_eq!(window.len(), 2);
        assert_eq!(window[0].service, "cortex_analyst");
        assert_eq!(window[0].message_count, Some(3));
        assert_eq!(window[1].credits, Some(2.0));
        assert_eq!(window[1].page_count, None);
    }

    #[tokio::test]
    async fn test_window_keeps_unparseable_dates() {
        let db = init_in_memory().await.unwrap();
        let rows = vec![
            raw("2025-01-02", "cortex_analyst", 1.0),
            raw("bad-date", "cortex_analyst", 1.0),
            raw("2025-02-30 10:00:00", "cortex_analyst", 1.0),
            raw("2024-06-01", "cortex_analyst", 1.0),
        ];
        UsageRecord::insert_many(&db, &rows).await.unwrap();

        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        let window = UsageRecord::list_window(&db, start, end).await.unwrap();

        let times: Vec<&str> = window.iter().map(|r| r.usage_time.as_str()).collect();
        assert_eq!(times, vec!["2025-01-02", "2025-02-30 10:00:00", "bad-date"]);
    }
}
