use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use uuid::Uuid;

/// Deltas to add to one subscription's ledger for one day.
#[derive(Debug, Clone)]
pub struct UsageEntry {
    pub subscription_id: Uuid,
    pub date: NaiveDate,
    pub api_calls: i64,
    pub data_mb: BigDecimal,
    pub requests_successful: i64,
    pub requests_failed: i64,
    pub response_time_ms: Option<f64>,
}
