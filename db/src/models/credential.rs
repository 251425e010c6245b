use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use serde::Serialize;
use uuid::Uuid;

use super::subscription::{Subscription, SubscriptionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Credential {
    pub id: Uuid,
    /// Stable public handle, embedded in the credential and used for lookups.
    pub credential_id: Uuid,
    pub owner_id: Uuid,
    pub subscription_id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Checks a new credential against its subscription and the credentials
/// currently active on it. `replaces` is ignored for quota and name purposes
/// and must name one of the active credentials.
pub fn admit(
    subscription: &Subscription,
    candidate: &Credential,
    active: &[Credential],
    quota: u32,
    replaces: Option<Uuid>,
) -> Res<()> {
    if !subscription.is_eligible(candidate.created_at) {
        let reason = if subscription.status == SubscriptionStatus::Active {
            "expired".to_string()
        } else {
            subscription.status.to_string()
        };
        return Err(AppError::SubscriptionNotEligible(format!(
            "Subscription is {}",
            reason
        )));
    }

    if let Some(old_id) = replaces {
        if !active.iter().any(|c| c.is_active && c.credential_id == old_id) {
            return Err(AppError::InvalidTransition(
                "Replaced credential is not active on this subscription".to_string(),
            ));
        }
    }

    let remaining: Vec<&Credential> = active
        .iter()
        .filter(|c| c.is_active && Some(c.credential_id) != replaces)
        .collect();

    if remaining.len() >= quota as usize {
        return Err(AppError::QuotaExceeded(quota));
    }
    if remaining.iter().any(|c| c.name == candidate.name) {
        return Err(AppError::DuplicateName(candidate.name.clone()));
    }
    Ok(())
}
