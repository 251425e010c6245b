use std::{fmt, str::FromStr};

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use common::error::AppError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A subscription only exists once payment is confirmed, so the pre-payment
/// `pending` phase has no row and no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// No transition leaves a terminal state. Entering one deactivates credentials.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "paused" => Ok(SubscriptionStatus::Paused),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(AppError::Internal(format!(
                "Unknown subscription status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub status: SubscriptionStatus,
    pub duration_key: String,
    pub total_cost: BigDecimal,
    pub created_at: DateTime<Utc>,
    /// Absolute deadline fixed at activation. Pausing does not move it.
    pub expires_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub api_calls_made: i64,
    pub api_calls_limit: i64,
    pub data_downloaded_mb: BigDecimal,
    pub data_limit_mb: i64,
}

impl Subscription {
    /// True when the next reconcile must move this subscription to `expired`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && now >= self.expires_at
    }

    /// Active and inside its window: the only state credentials may be minted in.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && now < self.expires_at
    }

    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        if self.status.is_terminal() {
            return 0;
        }
        (self.expires_at - now).num_seconds().max(0)
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.seconds_remaining(now) / 86_400
    }

    pub fn usage_percentage(&self) -> f64 {
        percentage(self.api_calls_made as f64, self.api_calls_limit as f64)
    }

    pub fn data_percentage(&self) -> f64 {
        percentage(
            self.data_downloaded_mb.to_f64().unwrap_or(0.0),
            self.data_limit_mb as f64,
        )
    }
}

/// `made / limit` as a percentage clamped to 100. A zero limit reads as 0.
pub fn percentage(made: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        return 0.0;
    }
    (made / limit * 100.0).min(100.0)
}
