use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::error::Res;
use uuid::Uuid;

use crate::{
    dtos::{
        subscription::{StatusChange, TransitionOutcome},
        usage::UsageEntry,
    },
    models::{credential::Credential, plan::Plan, subscription::Subscription, usage::UsageRecord},
};

/// Handle shared through `web::Data` and background tasks.
pub type SharedStore = Arc<dyn Store>;

/// Persistence for plans, subscriptions, the usage ledger and credentials.
///
/// Every mutating method is one atomic unit of work: either all of its
/// writes land or none do.
#[async_trait]
pub trait Store: Send + Sync {
    // Plans

    async fn list_plans(&self, active_only: bool) -> Res<Vec<Plan>>;

    async fn get_plan(&self, plan_id: Uuid) -> Res<Option<Plan>>;

    async fn insert_plan(&self, plan: &Plan) -> Res<Plan>;

    /// Fails with `NotFound` when the plan does not exist.
    async fn set_plan_active(&self, plan_id: Uuid, is_active: bool) -> Res<Plan>;

    // Subscriptions

    async fn insert_subscription(&self, subscription: &Subscription) -> Res<Subscription>;

    async fn get_subscription(&self, subscription_id: Uuid) -> Res<Option<Subscription>>;

    /// Newest first.
    async fn list_subscriptions(&self, owner_id: Uuid) -> Res<Vec<Subscription>>;

    /// Active subscriptions whose deadline is at or before `now`.
    async fn list_overdue_subscriptions(&self, now: DateTime<Utc>) -> Res<Vec<Subscription>>;

    /// Guarded status change. Fails with `NotFound` when the subscription does not exist.
    async fn transition_subscription(
        &self,
        subscription_id: Uuid,
        change: &StatusChange,
    ) -> Res<TransitionOutcome>;

    // Usage ledger

    /// Adds the entry to the (subscription, day) record and to the
    /// subscription's running totals. Fails with `NotFound` for an unknown subscription.
    async fn record_usage(&self, entry: &UsageEntry) -> Res<UsageRecord>;

    /// Records for any of `subscription_ids` with `start <= date <= end`, ordered by date.
    async fn usage_between(
        &self,
        subscription_ids: &[Uuid],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Res<Vec<UsageRecord>>;

    // Credentials

    /// Inserts `credential` while holding its subscription, after checking the
    /// subscription is eligible at `credential.created_at`, the active count
    /// is under `quota` and the name is free. When `replaces` is set, that
    /// credential must still be active on the subscription; it is deactivated
    /// in the same unit and does not count against the quota or the name
    /// check. A revoked or foreign `replaces` is an `InvalidTransition`.
    async fn insert_credential(
        &self,
        credential: &Credential,
        quota: u32,
        replaces: Option<Uuid>,
    ) -> Res<Credential>;

    async fn get_credential(&self, credential_id: Uuid) -> Res<Option<Credential>>;

    /// Newest first, optionally narrowed to one subscription.
    async fn list_credentials(
        &self,
        owner_id: Uuid,
        subscription_id: Option<Uuid>,
    ) -> Res<Vec<Credential>>;

    /// Returns `true` if the credential was active before the call.
    async fn deactivate_credential(&self, credential_id: Uuid) -> Res<bool>;

    async fn touch_credential(&self, credential_id: Uuid, at: DateTime<Utc>) -> Res<()>;

    /// Deactivates active credentials whose own deadline has passed.
    async fn deactivate_expired_credentials(&self, now: DateTime<Utc>) -> Res<u64>;
}
