use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::error::{AppError, Res};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    dtos::{
        subscription::{StatusChange, TransitionOutcome},
        usage::UsageEntry,
    },
    models::{
        credential::{self as credential_rules, Credential},
        plan::Plan,
        subscription::Subscription,
        usage::UsageRecord,
    },
    store::Store,
};

pub mod credential;
pub mod plan;
pub mod subscription;
pub mod usage;

/// Postgres-backed store. Multi-row units run in one transaction holding the
/// subscription row (`FOR UPDATE`).
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_plans(&self, active_only: bool) -> Res<Vec<Plan>> {
        plan::get_plans(&*self.pool, active_only).await
    }

    async fn get_plan(&self, plan_id: Uuid) -> Res<Option<Plan>> {
        plan::get_plan_by_id(&*self.pool, plan_id).await
    }

    async fn insert_plan(&self, new_plan: &Plan) -> Res<Plan> {
        plan::insert_plan(&*self.pool, new_plan).await
    }

    async fn set_plan_active(&self, plan_id: Uuid, is_active: bool) -> Res<Plan> {
        plan::update_plan_active(&*self.pool, plan_id, is_active)
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))
    }

    async fn insert_subscription(&self, sub: &Subscription) -> Res<Subscription> {
        subscription::insert_subscription(&*self.pool, sub).await
    }

    async fn get_subscription(&self, subscription_id: Uuid) -> Res<Option<Subscription>> {
        subscription::get_subscription_by_id(&*self.pool, subscription_id).await
    }

    async fn list_subscriptions(&self, owner_id: Uuid) -> Res<Vec<Subscription>> {
        subscription::get_subscriptions_by_owner(&*self.pool, owner_id).await
    }

    async fn list_overdue_subscriptions(&self, now: DateTime<Utc>) -> Res<Vec<Subscription>> {
        subscription::get_overdue_subscriptions(&*self.pool, now).await
    }

    async fn transition_subscription(
        &self,
        subscription_id: Uuid,
        change: &StatusChange,
    ) -> Res<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        let mut current = subscription::lock_subscription(&mut *tx, subscription_id).await?;
        if !change.permits(&current) {
            tx.rollback().await?;
            return Ok(TransitionOutcome::Rejected { current });
        }

        change.apply(&mut current);
        subscription::update_subscription_state(&mut *tx, &current).await?;

        let credentials_deactivated = if change.to.is_terminal() {
            credential::deactivate_credentials_by_subscription(&mut *tx, subscription_id).await?
        } else {
            0
        };

        tx.commit().await?;
        Ok(TransitionOutcome::Applied {
            subscription: current,
            credentials_deactivated,
        })
    }

    async fn record_usage(&self, entry: &UsageEntry) -> Res<UsageRecord> {
        let mut tx = self.pool.begin().await?;

        subscription::lock_subscription(&mut *tx, entry.subscription_id).await?;
        let record = usage::upsert_usage(&mut *tx, entry)
            .await
            .map_err(usage::overflow_as_bad_request)?;
        subscription::add_subscription_usage(
            &mut *tx,
            entry.subscription_id,
            entry.api_calls,
            &entry.data_mb,
        )
        .await
        .map_err(usage::overflow_as_bad_request)?;

        tx.commit().await?;
        Ok(record)
    }

    async fn usage_between(
        &self,
        subscription_ids: &[Uuid],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Res<Vec<UsageRecord>> {
        usage::get_usage_between(&*self.pool, subscription_ids, start, end).await
    }

    async fn insert_credential(
        &self,
        candidate: &Credential,
        quota: u32,
        replaces: Option<Uuid>,
    ) -> Res<Credential> {
        let mut tx = self.pool.begin().await?;

        let sub = subscription::lock_subscription(&mut *tx, candidate.subscription_id).await?;
        let active = credential::get_active_credentials_by_subscription(&mut *tx, sub.id).await?;
        if let Err(err) = credential_rules::admit(&sub, candidate, &active, quota, replaces) {
            tx.rollback().await?;
            return Err(err);
        }

        if let Some(old_id) = replaces {
            credential::deactivate_credential(&mut *tx, old_id).await?;
        }
        let inserted = credential::insert_credential(&mut *tx, candidate).await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_credential(&self, credential_id: Uuid) -> Res<Option<Credential>> {
        credential::get_credential_by_credential_id(&*self.pool, credential_id).await
    }

    async fn list_credentials(
        &self,
        owner_id: Uuid,
        subscription_id: Option<Uuid>,
    ) -> Res<Vec<Credential>> {
        credential::get_credentials_by_owner(&*self.pool, owner_id, subscription_id).await
    }

    async fn deactivate_credential(&self, credential_id: Uuid) -> Res<bool> {
        let changed = credential::deactivate_credential(&*self.pool, credential_id).await?;
        Ok(changed > 0)
    }

    async fn touch_credential(&self, credential_id: Uuid, at: DateTime<Utc>) -> Res<()> {
        credential::update_last_used(&*self.pool, credential_id, at).await
    }

    async fn deactivate_expired_credentials(&self, now: DateTime<Utc>) -> Res<u64> {
        credential::deactivate_expired_credentials(&*self.pool, now).await
    }
}
