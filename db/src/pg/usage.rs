use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    dtos::usage::UsageEntry,
    models::usage::{UsageRecord, add_counter},
};

#[derive(Debug, sqlx::FromRow)]
pub struct UsageRow {
    pub subscription_id: Uuid,
    pub date: NaiveDate,
    pub api_calls: i64,
    pub data_downloaded_mb: BigDecimal,
    pub requests_successful: i64,
    pub requests_failed: i64,
    pub avg_response_time_ms: f64,
}

impl From<UsageRow> for UsageRecord {
    fn from(row: UsageRow) -> Self {
        UsageRecord {
            subscription_id: row.subscription_id,
            date: row.date,
            api_calls: row.api_calls,
            data_downloaded_mb: row.data_downloaded_mb,
            requests_successful: row.requests_successful,
            requests_failed: row.requests_failed,
            avg_response_time_ms: row.avg_response_time_ms,
        }
    }
}

/// Insert-or-accumulate on (subscription_id, date). The average is weighted
/// by request count the same way [`UsageRecord::accumulate`] does it, so a
/// sample that carries no requests leaves it unchanged.
pub async fn upsert_usage<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    entry: &UsageEntry,
) -> Res<UsageRecord> {
    let sample_weight = add_counter(entry.requests_successful, entry.requests_failed)?;

    sqlx::query_as::<_, UsageRow>(
        r#"
        INSERT INTO usage_records (
            subscription_id, date, api_calls, data_downloaded_mb,
            requests_successful, requests_failed, avg_response_time_ms
        )
        VALUES (
            $1, $2, $3, $4, $5, $6,
            CASE WHEN $8::bigint > 0 THEN COALESCE($7::float8, 0) ELSE 0 END
        )
        ON CONFLICT (subscription_id, date) DO UPDATE SET
            avg_response_time_ms = CASE
                WHEN $7::float8 IS NULL OR $8::bigint = 0
                    THEN usage_records.avg_response_time_ms
                ELSE (
                    usage_records.avg_response_time_ms
                        * (usage_records.requests_successful + usage_records.requests_failed)
                    + $7::float8 * $8::bigint
                ) / (usage_records.requests_successful + usage_records.requests_failed + $8::bigint)
            END,
            api_calls = usage_records.api_calls + EXCLUDED.api_calls,
            data_downloaded_mb = usage_records.data_downloaded_mb + EXCLUDED.data_downloaded_mb,
            requests_successful = usage_records.requests_successful + EXCLUDED.requests_successful,
            requests_failed = usage_records.requests_failed + EXCLUDED.requests_failed
        RETURNING *
        "#,
    )
    .bind(entry.subscription_id)
    .bind(entry.date)
    .bind(entry.api_calls)
    .bind(&entry.data_mb)
    .bind(entry.requests_successful)
    .bind(entry.requests_failed)
    .bind(entry.response_time_ms)
    .bind(sample_weight)
    .fetch_one(executor)
    .await
    .map(UsageRecord::from)
    .map_err(AppError::from)
}

/// Postgres reports bigint overflow as SQLSTATE 22003; callers see it as a
/// rejected entry rather than a storage failure.
pub fn overflow_as_bad_request(err: AppError) -> AppError {
    match &err {
        AppError::Database(sqlx::Error::Database(db)) if db.code().as_deref() == Some("22003") => {
            AppError::BadRequest("Usage counter overflow".to_string())
        }
        _ => err,
    }
}

pub async fn get_usage_between<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_ids: &[Uuid],
    start: NaiveDate,
    end: NaiveDate,
) -> Res<Vec<UsageRecord>> {
    let rows = sqlx::query_as::<_, UsageRow>(
        r#"
        SELECT * FROM usage_records
        WHERE subscription_id = ANY($1) AND date BETWEEN $2 AND $3
        ORDER BY date
        "#,
    )
    .bind(subscription_ids)
    .bind(start)
    .bind(end)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(UsageRecord::from).collect())
}
