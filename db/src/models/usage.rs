use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::error::{AppError, Res};

use crate::dtos::usage::UsageEntry;

/// One row per (subscription, day). Writes for the same day accumulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub subscription_id: Uuid,
    pub date: NaiveDate,
    pub api_calls: i64,
    pub data_downloaded_mb: BigDecimal,
    pub requests_successful: i64,
    pub requests_failed: i64,
    pub avg_response_time_ms: f64,
}

impl UsageRecord {
    pub fn empty(subscription_id: Uuid, date: NaiveDate) -> Self {
        Self {
            subscription_id,
            date,
            api_calls: 0,
            data_downloaded_mb: BigDecimal::from(0),
            requests_successful: 0,
            requests_failed: 0,
            avg_response_time_ms: 0.0,
        }
    }

    pub fn requests(&self) -> i64 {
        self.requests_successful.saturating_add(self.requests_failed)
    }

    /// Adds the entry's deltas. The response-time average is weighted by
    /// the number of requests each side represents; a sample that stands for
    /// no requests carries no weight and is skipped.
    ///
    /// Fails with `BadRequest`, leaving the record untouched, when a counter
    /// would overflow.
    pub fn accumulate(&mut self, entry: &UsageEntry) -> Res<()> {
        let api_calls = add_counter(self.api_calls, entry.api_calls)?;
        let requests_successful = add_counter(self.requests_successful, entry.requests_successful)?;
        let requests_failed = add_counter(self.requests_failed, entry.requests_failed)?;
        let added = add_counter(entry.requests_successful, entry.requests_failed)?;

        if let Some(sample) = entry.response_time_ms.filter(|_| added > 0) {
            self.avg_response_time_ms =
                weighted_average(self.avg_response_time_ms, self.requests(), sample, added);
        }
        self.api_calls = api_calls;
        self.data_downloaded_mb += &entry.data_mb;
        self.requests_successful = requests_successful;
        self.requests_failed = requests_failed;
        Ok(())
    }

    pub fn success_rate(&self) -> f64 {
        success_rate(self.requests_successful, self.requests_failed)
    }
}

/// `current + delta`, or `BadRequest` when the sum does not fit a counter.
pub fn add_counter(current: i64, delta: i64) -> Res<i64> {
    current
        .checked_add(delta)
        .ok_or_else(|| AppError::BadRequest("Usage counter overflow".to_string()))
}

pub fn weighted_average(current: f64, current_weight: i64, sample: f64, sample_weight: i64) -> f64 {
    let total = current_weight as f64 + sample_weight as f64;
    if total <= 0.0 {
        return current;
    }
    (current * current_weight as f64 + sample * sample_weight as f64) / total
}

/// Percentage of successful requests; 100 when there were none.
pub fn success_rate(successful: i64, failed: i64) -> f64 {
    let total = successful as f64 + failed as f64;
    if total <= 0.0 {
        return 100.0;
    }
    successful as f64 / total * 100.0
}

/// One point of a rollup series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub calls: i64,
    pub data_mb: f64,
    pub requests_successful: i64,
    pub requests_failed: i64,
    pub success_rate: f64,
}

impl DailyUsage {
    pub fn zero(date: NaiveDate) -> Self {
        Self {
            date,
            calls: 0,
            data_mb: 0.0,
            requests_successful: 0,
            requests_failed: 0,
            success_rate: 100.0,
        }
    }

    pub fn add(&mut self, record: &UsageRecord) {
        self.calls = self.calls.saturating_add(record.api_calls);
        self.data_mb += record.data_downloaded_mb.to_f64().unwrap_or(0.0);
        self.requests_successful = self
            .requests_successful
            .saturating_add(record.requests_successful);
        self.requests_failed = self.requests_failed.saturating_add(record.requests_failed);
        self.success_rate = success_rate(self.requests_successful, self.requests_failed);
    }
}
