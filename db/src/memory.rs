use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::error::{AppError, Res};
use uuid::Uuid;

use crate::{
    dtos::{
        subscription::{StatusChange, TransitionOutcome},
        usage::UsageEntry,
    },
    models::{
        credential::{self, Credential},
        plan::Plan,
        subscription::{Subscription, SubscriptionStatus},
        usage::{UsageRecord, add_counter},
    },
    store::Store,
};

#[derive(Default)]
struct Tables {
    plans: HashMap<Uuid, Plan>,
    subscriptions: HashMap<Uuid, Subscription>,
    usage: HashMap<(Uuid, NaiveDate), UsageRecord>,
    /// keyed by `credential_id`
    credentials: HashMap<Uuid, Credential>,
}

/// In-process store used in development (`DATABASE_URL=memory://`) and tests.
///
/// A single mutex serialises every unit of work, which gives the same
/// atomicity the Postgres store gets from row locks.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Res<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal("Memory store lock poisoned".to_string()))
    }
}

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_plans(&self, active_only: bool) -> Res<Vec<Plan>> {
        let tables = self.tables()?;
        let mut plans: Vec<Plan> = tables
            .plans
            .values()
            .filter(|p| !active_only || p.is_active)
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    async fn get_plan(&self, plan_id: Uuid) -> Res<Option<Plan>> {
        Ok(self.tables()?.plans.get(&plan_id).cloned())
    }

    async fn insert_plan(&self, plan: &Plan) -> Res<Plan> {
        self.tables()?.plans.insert(plan.id, plan.clone());
        Ok(plan.clone())
    }

    async fn set_plan_active(&self, plan_id: Uuid, is_active: bool) -> Res<Plan> {
        let mut tables = self.tables()?;
        let plan = tables
            .plans
            .get_mut(&plan_id)
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;
        plan.is_active = is_active;
        Ok(plan.clone())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Res<Subscription> {
        self.tables()?
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription.clone())
    }

    async fn get_subscription(&self, subscription_id: Uuid) -> Res<Option<Subscription>> {
        Ok(self.tables()?.subscriptions.get(&subscription_id).cloned())
    }

    async fn list_subscriptions(&self, owner_id: Uuid) -> Res<Vec<Subscription>> {
        let tables = self.tables()?;
        let mut subs: Vec<Subscription> = tables
            .subscriptions
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        newest_first(&mut subs, |s| s.created_at);
        Ok(subs)
    }

    async fn list_overdue_subscriptions(&self, now: DateTime<Utc>) -> Res<Vec<Subscription>> {
        let tables = self.tables()?;
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.is_overdue(now))
            .cloned()
            .collect())
    }

    async fn transition_subscription(
        &self,
        subscription_id: Uuid,
        change: &StatusChange,
    ) -> Res<TransitionOutcome> {
        let mut tables = self.tables()?;
        let subscription = tables
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        if !change.permits(subscription) {
            return Ok(TransitionOutcome::Rejected {
                current: subscription.clone(),
            });
        }
        change.apply(subscription);
        let subscription = subscription.clone();

        let mut credentials_deactivated = 0;
        if change.to.is_terminal() {
            for credential in tables.credentials.values_mut() {
                if credential.subscription_id == subscription_id && credential.is_active {
                    credential.is_active = false;
                    credentials_deactivated += 1;
                }
            }
        }

        Ok(TransitionOutcome::Applied {
            subscription,
            credentials_deactivated,
        })
    }

    async fn record_usage(&self, entry: &UsageEntry) -> Res<UsageRecord> {
        let mut guard = self.tables()?;
        let tables = &mut *guard;
        let subscription = tables
            .subscriptions
            .get_mut(&entry.subscription_id)
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
        let api_calls_made = add_counter(subscription.api_calls_made, entry.api_calls)?;

        let key = (entry.subscription_id, entry.date);
        let mut record = tables
            .usage
            .get(&key)
            .cloned()
            .unwrap_or_else(|| UsageRecord::empty(entry.subscription_id, entry.date));
        record.accumulate(entry)?;

        // nothing is written until every counter has been checked
        subscription.api_calls_made = api_calls_made;
        subscription.data_downloaded_mb += &entry.data_mb;
        tables.usage.insert(key, record.clone());
        Ok(record)
    }

    async fn usage_between(
        &self,
        subscription_ids: &[Uuid],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Res<Vec<UsageRecord>> {
        let tables = self.tables()?;
        let mut records: Vec<UsageRecord> = tables
            .usage
            .values()
            .filter(|r| {
                subscription_ids.contains(&r.subscription_id) && r.date >= start && r.date <= end
            })
            .cloned()
            .collect();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }

    async fn insert_credential(
        &self,
        candidate: &Credential,
        quota: u32,
        replaces: Option<Uuid>,
    ) -> Res<Credential> {
        let mut tables = self.tables()?;
        let subscription = tables
            .subscriptions
            .get(&candidate.subscription_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        let active: Vec<Credential> = tables
            .credentials
            .values()
            .filter(|c| c.subscription_id == subscription.id && c.is_active)
            .cloned()
            .collect();
        credential::admit(&subscription, candidate, &active, quota, replaces)?;

        if tables.credentials.contains_key(&candidate.credential_id) {
            return Err(AppError::Internal("Credential id collision".to_string()));
        }
        if let Some(old_id) = replaces {
            if let Some(old) = tables.credentials.get_mut(&old_id) {
                old.is_active = false;
            }
        }
        tables
            .credentials
            .insert(candidate.credential_id, candidate.clone());
        Ok(candidate.clone())
    }

    async fn get_credential(&self, credential_id: Uuid) -> Res<Option<Credential>> {
        Ok(self.tables()?.credentials.get(&credential_id).cloned())
    }

    async fn list_credentials(
        &self,
        owner_id: Uuid,
        subscription_id: Option<Uuid>,
    ) -> Res<Vec<Credential>> {
        let tables = self.tables()?;
        let mut credentials: Vec<Credential> = tables
            .credentials
            .values()
            .filter(|c| c.owner_id == owner_id)
            .filter(|c| subscription_id.is_none_or(|id| c.subscription_id == id))
            .cloned()
            .collect();
        newest_first(&mut credentials, |c| c.created_at);
        Ok(credentials)
    }

    async fn deactivate_credential(&self, credential_id: Uuid) -> Res<bool> {
        let mut tables = self.tables()?;
        match tables.credentials.get_mut(&credential_id) {
            Some(credential) if credential.is_active => {
                credential.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_credential(&self, credential_id: Uuid, at: DateTime<Utc>) -> Res<()> {
        if let Some(credential) = self.tables()?.credentials.get_mut(&credential_id) {
            credential.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn deactivate_expired_credentials(&self, now: DateTime<Utc>) -> Res<u64> {
        let mut tables = self.tables()?;
        let mut count = 0;
        for credential in tables.credentials.values_mut() {
            if credential.is_active && credential.is_expired(now) {
                credential.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bigdecimal::BigDecimal;
    use chrono::Duration;

    use super::*;

    fn subscription(now: DateTime<Utc>) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            plan_name: "Basic".to_string(),
            status: SubscriptionStatus::Active,
            duration_key: "2-hours".to_string(),
            total_cost: BigDecimal::from(20),
            created_at: now,
            expires_at: now + Duration::hours(2),
            paused_at: None,
            cancelled_at: None,
            api_calls_made: 0,
            api_calls_limit: 1000,
            data_downloaded_mb: BigDecimal::from(0),
            data_limit_mb: 100,
        }
    }

    fn credential(sub: &Subscription, name: &str) -> Credential {
        Credential {
            id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
            owner_id: sub.owner_id,
            subscription_id: sub.id,
            name: name.to_string(),
            secret_hash: String::new(),
            created_at: sub.created_at,
            expires_at: sub.expires_at,
            is_active: true,
            last_used_at: None,
        }
    }

    fn entry(sub: &Subscription, calls: i64) -> UsageEntry {
        UsageEntry {
            subscription_id: sub.id,
            date: sub.created_at.date_naive(),
            api_calls: calls,
            data_mb: BigDecimal::from(1),
            requests_successful: calls,
            requests_failed: 0,
            response_time_ms: Some(10.0),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_usage_writes_are_all_counted() {
        let store = Arc::new(MemoryStore::new());
        let sub = store.insert_subscription(&subscription(Utc::now())).await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                let entry = entry(&sub, 3);
                tokio::spawn(async move { store.record_usage(&entry).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let day = sub.created_at.date_naive();
        let records = store.usage_between(&[sub.id], day, day).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].api_calls, 150);

        let stored = store.get_subscription(sub.id).await.unwrap().unwrap();
        assert_eq!(stored.api_calls_made, 150);
        assert_eq!(stored.data_downloaded_mb, BigDecimal::from(50));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_never_exceed_quota() {
        let store = Arc::new(MemoryStore::new());
        let sub = store.insert_subscription(&subscription(Utc::now())).await.unwrap();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                let candidate = credential(&sub, &format!("key-{}", i));
                tokio::spawn(async move { store.insert_credential(&candidate, 3, None).await })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => inserted += 1,
                Err(err) => assert!(matches!(err, AppError::QuotaExceeded(3))),
            }
        }
        assert_eq!(inserted, 3);
    }

    #[tokio::test]
    async fn guarded_transition_applies_once_and_cascades() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = store.insert_subscription(&subscription(now)).await.unwrap();
        let cred = store
            .insert_credential(&credential(&sub, "main"), 5, None)
            .await
            .unwrap();

        let cancel = StatusChange::new(
            &[SubscriptionStatus::Active, SubscriptionStatus::Paused],
            SubscriptionStatus::Cancelled,
            now,
        );
        let first = store.transition_subscription(sub.id, &cancel).await.unwrap();
        match first {
            TransitionOutcome::Applied {
                subscription,
                credentials_deactivated,
            } => {
                assert_eq!(subscription.status, SubscriptionStatus::Cancelled);
                assert_eq!(subscription.cancelled_at, Some(now));
                assert_eq!(credentials_deactivated, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let expire = StatusChange::expire(SubscriptionStatus::Active, sub.expires_at);
        let second = store.transition_subscription(sub.id, &expire).await.unwrap();
        assert!(!second.is_applied());
        assert_eq!(second.subscription().status, SubscriptionStatus::Cancelled);

        let stored = store.get_credential(cred.credential_id).await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_cancel_and_expire_apply_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let sub = store.insert_subscription(&subscription(now)).await.unwrap();
        for name in ["a", "b", "c"] {
            store
                .insert_credential(&credential(&sub, name), 5, None)
                .await
                .unwrap();
        }

        let later = sub.expires_at + Duration::seconds(1);
        let sub_id = sub.id;
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let change = if i % 2 == 0 {
                    StatusChange::new(
                        &[SubscriptionStatus::Active, SubscriptionStatus::Paused],
                        SubscriptionStatus::Cancelled,
                        later,
                    )
                } else {
                    StatusChange::expire(SubscriptionStatus::Active, later)
                };
                tokio::spawn(async move { store.transition_subscription(sub_id, &change).await })
            })
            .collect();

        let mut applied = 0;
        let mut deactivated = 0;
        for handle in handles {
            if let TransitionOutcome::Applied {
                credentials_deactivated,
                ..
            } = handle.await.unwrap().unwrap()
            {
                applied += 1;
                deactivated += credentials_deactivated;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(deactivated, 3);

        let stored = store.get_subscription(sub.id).await.unwrap().unwrap();
        assert!(stored.status.is_terminal());
        let listed = store.list_credentials(sub.owner_id, Some(sub.id)).await.unwrap();
        assert!(listed.iter().all(|c| !c.is_active));
    }

    #[tokio::test]
    async fn expire_requires_deadline_passed() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = store.insert_subscription(&subscription(now)).await.unwrap();

        let early = StatusChange::expire(SubscriptionStatus::Active, now);
        assert!(!store.transition_subscription(sub.id, &early).await.unwrap().is_applied());

        let overdue = store.list_overdue_subscriptions(sub.expires_at).await.unwrap();
        assert_eq!(overdue.len(), 1);
    }

    #[tokio::test]
    async fn replacing_keeps_name_and_deactivates_old() {
        let store = MemoryStore::new();
        let sub = store.insert_subscription(&subscription(Utc::now())).await.unwrap();
        let old = store
            .insert_credential(&credential(&sub, "ci"), 1, None)
            .await
            .unwrap();

        let new = store
            .insert_credential(&credential(&sub, "ci"), 1, Some(old.credential_id))
            .await
            .unwrap();

        let listed = store.list_credentials(sub.owner_id, Some(sub.id)).await.unwrap();
        assert_eq!(listed.len(), 2);
        let active: Vec<_> = listed.iter().filter(|c| c.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].credential_id, new.credential_id);
    }

    #[tokio::test]
    async fn replacing_a_revoked_credential_is_rejected() {
        let store = MemoryStore::new();
        let sub = store.insert_subscription(&subscription(Utc::now())).await.unwrap();
        let old = store
            .insert_credential(&credential(&sub, "ci"), 2, None)
            .await
            .unwrap();
        assert!(store.deactivate_credential(old.credential_id).await.unwrap());

        let result = store
            .insert_credential(&credential(&sub, "ci"), 2, Some(old.credential_id))
            .await;
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));

        let listed = store.list_credentials(sub.owner_id, Some(sub.id)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].is_active);
    }

    #[tokio::test]
    async fn replacing_another_subscriptions_credential_is_rejected() {
        let store = MemoryStore::new();
        let sub = store.insert_subscription(&subscription(Utc::now())).await.unwrap();
        let other = store.insert_subscription(&subscription(Utc::now())).await.unwrap();
        let foreign = store
            .insert_credential(&credential(&other, "ci"), 2, None)
            .await
            .unwrap();

        let result = store
            .insert_credential(&credential(&sub, "ci"), 2, Some(foreign.credential_id))
            .await;
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));

        let kept = store.get_credential(foreign.credential_id).await.unwrap().unwrap();
        assert!(kept.is_active);
    }

    #[tokio::test]
    async fn overflowing_usage_is_rejected_and_store_stays_usable() {
        let store = MemoryStore::new();
        let sub = store.insert_subscription(&subscription(Utc::now())).await.unwrap();

        store.record_usage(&entry(&sub, i64::MAX)).await.unwrap();
        assert!(matches!(
            store.record_usage(&entry(&sub, 1)).await,
            Err(AppError::BadRequest(_))
        ));

        let stored = store.get_subscription(sub.id).await.unwrap().unwrap();
        assert_eq!(stored.api_calls_made, i64::MAX);
        assert_eq!(stored.data_downloaded_mb, BigDecimal::from(1));

        let day = sub.created_at.date_naive();
        let records = store.usage_between(&[sub.id], day, day).await.unwrap();
        assert_eq!(records[0].api_calls, i64::MAX);
        assert_eq!(records[0].requests_successful, i64::MAX);

        let other = store.insert_subscription(&subscription(Utc::now())).await.unwrap();
        assert_eq!(store.record_usage(&entry(&other, 2)).await.unwrap().api_calls, 2);
    }

    #[tokio::test]
    async fn unknown_subscription_is_not_found() {
        let store = MemoryStore::new();
        let sub = subscription(Utc::now());
        assert!(matches!(
            store.record_usage(&entry(&sub, 1)).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store
                .transition_subscription(
                    sub.id,
                    &StatusChange::expire(SubscriptionStatus::Active, Utc::now())
                )
                .await,
            Err(AppError::NotFound(_))
        ));
    }
}
