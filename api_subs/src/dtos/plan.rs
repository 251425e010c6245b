use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PlanCreateRequest {
    pub name: String,
    pub description: Option<String>,
    /// duration key -> price, must cover every offered duration
    pub prices: BTreeMap<String, BigDecimal>,
    pub api_call_cap: i64,
    pub data_cap_mb: i64,
}

#[derive(Debug, Deserialize)]
pub struct PlanListQuery {
    pub include_inactive: Option<bool>,
}
