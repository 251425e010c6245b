use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use db::models::usage::DailyUsage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UsageRangeQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub window_days: Option<u32>,
}

/// Whose ledger a rollup reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupScope {
    Subscription(Uuid),
    Owner,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionUsageResponse {
    pub subscription_id: Uuid,
    pub api_calls_made: i64,
    pub api_calls_limit: i64,
    pub data_downloaded_mb: BigDecimal,
    pub data_limit_mb: i64,
    pub usage_percentage: f64,
    pub data_percentage: f64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub series: Vec<DailyUsage>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct StatusCounts {
    pub active: u32,
    pub paused: u32,
    pub expired: u32,
    pub cancelled: u32,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_subscriptions: u32,
    pub counts: StatusCounts,
    /// Sum of `total_cost` over every subscription, expired and cancelled included.
    pub lifetime_spend: BigDecimal,
    pub total_api_calls: i64,
    pub total_data_mb: BigDecimal,
    pub window_days: u32,
    pub series: Vec<DailyUsage>,
}
