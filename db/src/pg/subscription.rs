use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::subscription::Subscription;

#[derive(Debug, sqlx::FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub status: String,
    pub duration_key: String,
    pub total_cost: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub api_calls_made: i64,
    pub api_calls_limit: i64,
    pub data_downloaded_mb: BigDecimal,
    pub data_limit_mb: i64,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = AppError;

    fn try_from(row: SubscriptionRow) -> Res<Self> {
        Ok(Subscription {
            id: row.id,
            owner_id: row.owner_id,
            plan_id: row.plan_id,
            plan_name: row.plan_name,
            status: row.status.parse()?,
            duration_key: row.duration_key,
            total_cost: row.total_cost,
            created_at: row.created_at,
            expires_at: row.expires_at,
            paused_at: row.paused_at,
            cancelled_at: row.cancelled_at,
            api_calls_made: row.api_calls_made,
            api_calls_limit: row.api_calls_limit,
            data_downloaded_mb: row.data_downloaded_mb,
            data_limit_mb: row.data_limit_mb,
        })
    }
}

fn convert_all(rows: Vec<SubscriptionRow>) -> Res<Vec<Subscription>> {
    rows.into_iter().map(Subscription::try_from).collect()
}

pub async fn get_subscription_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_id: Uuid,
) -> Res<Option<Subscription>> {
    sqlx::query_as::<_, SubscriptionRow>("SELECT * FROM subscriptions WHERE id = $1")
        .bind(subscription_id)
        .fetch_optional(executor)
        .await?
        .map(Subscription::try_from)
        .transpose()
}

/// Same as [`get_subscription_by_id`] but holds the row until the transaction ends.
pub async fn lock_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_id: Uuid,
) -> Res<Subscription> {
    sqlx::query_as::<_, SubscriptionRow>("SELECT * FROM subscriptions WHERE id = $1 FOR UPDATE")
        .bind(subscription_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
        .and_then(Subscription::try_from)
}

pub async fn get_subscriptions_by_owner<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    owner_id: Uuid,
) -> Res<Vec<Subscription>> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(
        "SELECT * FROM subscriptions WHERE owner_id = $1 ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(executor)
    .await?;
    convert_all(rows)
}

pub async fn get_overdue_subscriptions<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    now: DateTime<Utc>,
) -> Res<Vec<Subscription>> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(
        "SELECT * FROM subscriptions WHERE status = 'active' AND expires_at <= $1",
    )
    .bind(now)
    .fetch_all(executor)
    .await?;
    convert_all(rows)
}

pub async fn insert_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    sub: &Subscription,
) -> Res<Subscription> {
    let row = sqlx::query_as::<_, SubscriptionRow>(
        r#"
        INSERT INTO subscriptions (
            id, owner_id, plan_id, plan_name, status, duration_key, total_cost,
            created_at, expires_at, paused_at, cancelled_at,
            api_calls_made, api_calls_limit, data_downloaded_mb, data_limit_mb
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING *
        "#,
    )
    .bind(sub.id)
    .bind(sub.owner_id)
    .bind(sub.plan_id)
    .bind(&sub.plan_name)
    .bind(sub.status.as_str())
    .bind(&sub.duration_key)
    .bind(&sub.total_cost)
    .bind(sub.created_at)
    .bind(sub.expires_at)
    .bind(sub.paused_at)
    .bind(sub.cancelled_at)
    .bind(sub.api_calls_made)
    .bind(sub.api_calls_limit)
    .bind(&sub.data_downloaded_mb)
    .bind(sub.data_limit_mb)
    .fetch_one(executor)
    .await?;
    Subscription::try_from(row)
}

/// Persists the lifecycle fields only; counters are owned by the ledger.
pub async fn update_subscription_state<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    sub: &Subscription,
) -> Res<()> {
    sqlx::query(
        "UPDATE subscriptions SET status = $1, paused_at = $2, cancelled_at = $3 WHERE id = $4",
    )
    .bind(sub.status.as_str())
    .bind(sub.paused_at)
    .bind(sub.cancelled_at)
    .bind(sub.id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn add_subscription_usage<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_id: Uuid,
    api_calls: i64,
    data_mb: &BigDecimal,
) -> Res<()> {
    sqlx::query(
        r#"
        UPDATE subscriptions
        SET api_calls_made = api_calls_made + $1,
            data_downloaded_mb = data_downloaded_mb + $2
        WHERE id = $3
        "#,
    )
    .bind(api_calls)
    .bind(data_mb)
    .bind(subscription_id)
    .execute(executor)
    .await?;
    Ok(())
}
