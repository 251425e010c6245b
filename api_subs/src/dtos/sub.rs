use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use db::models::subscription::{Subscription, SubscriptionStatus};
use serde::Serialize;
use uuid::Uuid;

/// Subscription as shown to its owner, with derived remaining time and usage.
#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub status: SubscriptionStatus,
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
    pub days_remaining: i64,
    pub seconds_remaining: i64,
    pub usage_percentage: f64,
    pub data_percentage: f64,
}

impl SubscriptionView {
    pub fn new(sub: Subscription, now: DateTime<Utc>) -> Self {
        SubscriptionView {
            days_remaining: sub.days_remaining(now),
            seconds_remaining: sub.seconds_remaining(now),
            usage_percentage: sub.usage_percentage(),
            data_percentage: sub.data_percentage(),
            id: sub.id,
            plan_id: sub.plan_id,
            plan_name: sub.plan_name,
            status: sub.status,
            duration_key: sub.duration_key,
            total_cost: sub.total_cost,
            created_at: sub.created_at,
            expires_at: sub.expires_at,
            paused_at: sub.paused_at,
            cancelled_at: sub.cancelled_at,
            api_calls_made: sub.api_calls_made,
            api_calls_limit: sub.api_calls_limit,
            data_downloaded_mb: sub.data_downloaded_mb,
            data_limit_mb: sub.data_limit_mb,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionListResponse {
    pub subscriptions: Vec<SubscriptionView>,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub subscriptions_expired: u64,
    pub credentials_deactivated: u64,
}
