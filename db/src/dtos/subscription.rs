use chrono::{DateTime, Utc};

use crate::models::subscription::{Subscription, SubscriptionStatus};

/// A compare-and-set on a subscription's status.
///
/// Applied only when the current status is one of `from` (and, with
/// `require_overdue`, the deadline has passed at `at`). Entering a terminal
/// status deactivates every credential of the subscription in the same unit.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: Vec<SubscriptionStatus>,
    pub to: SubscriptionStatus,
    pub at: DateTime<Utc>,
    pub require_overdue: bool,
}

impl StatusChange {
    pub fn new(from: &[SubscriptionStatus], to: SubscriptionStatus, at: DateTime<Utc>) -> Self {
        Self {
            from: from.to_vec(),
            to,
            at,
            require_overdue: false,
        }
    }

    pub fn expire(from: SubscriptionStatus, at: DateTime<Utc>) -> Self {
        Self {
            from: vec![from],
            to: SubscriptionStatus::Expired,
            at,
            require_overdue: true,
        }
    }

    pub fn permits(&self, current: &Subscription) -> bool {
        self.from.contains(&current.status)
            && (!self.require_overdue || self.at >= current.expires_at)
    }

    /// Writes the new status and its timestamp onto `subscription`.
    pub fn apply(&self, subscription: &mut Subscription) {
        subscription.status = self.to;
        match self.to {
            SubscriptionStatus::Paused => subscription.paused_at = Some(self.at),
            SubscriptionStatus::Active => subscription.paused_at = None,
            SubscriptionStatus::Cancelled => subscription.cancelled_at = Some(self.at),
            SubscriptionStatus::Expired => {}
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied {
        subscription: Subscription,
        credentials_deactivated: u64,
    },
    /// The guard did not hold; carries the state that was observed instead.
    Rejected { current: Subscription },
}

impl TransitionOutcome {
    pub fn subscription(&self) -> &Subscription {
        match self {
            TransitionOutcome::Applied { subscription, .. } => subscription,
            TransitionOutcome::Rejected { current } => current,
        }
    }

    pub fn into_subscription(self) -> Subscription {
        match self {
            TransitionOutcome::Applied { subscription, .. } => subscription,
            TransitionOutcome::Rejected { current } => current,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}
