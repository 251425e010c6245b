use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use db::{
    dtos::subscription::{StatusChange, TransitionOutcome},
    models::subscription::{Subscription, SubscriptionStatus},
    store::Store,
};
use uuid::Uuid;

use crate::dtos::{pay::PaymentConfirmed, sub::SweepReport};

/// Creates an active subscription from a confirmed payment.
///
/// Caps and price are copied from the plan so later plan edits do not
/// change the subscription.
///
/// # Arguments
///
/// * `store` - The persistence handle.
/// * `payment` - Owner, plan, duration and the amount the provider charged.
/// * `now` - Activation instant; the deadline is `now + duration`.
///
/// # Returns
///
/// The new subscription, `NotFound` for an unknown plan, `PlanInactive` for a
/// retired one and `InvalidDuration` when the plan does not price the duration.
pub async fn create_from_payment(
    store: &dyn Store,
    payment: PaymentConfirmed,
    now: DateTime<Utc>,
) -> Res<Subscription> {
    let plan = store
        .get_plan(payment.plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

    if !plan.is_active {
        return Err(AppError::PlanInactive);
    }
    let (duration, price) = plan.price_for(&payment.duration_key)?;

    if let Some(charged) = &payment.amount_charged {
        if *charged != price {
            log::warn!(
                "Payment for plan {} charged {} but {} costs {}",
                plan.id,
                charged,
                duration,
                price
            );
        }
    }

    let subscription = Subscription {
        id: Uuid::new_v4(),
        owner_id: payment.owner_id,
        plan_id: plan.id,
        plan_name: plan.name.clone(),
        status: SubscriptionStatus::Active,
        duration_key: duration.as_str().to_string(),
        total_cost: price,
        created_at: now,
        expires_at: now + duration.duration(),
        paused_at: None,
        cancelled_at: None,
        api_calls_made: 0,
        api_calls_limit: plan.api_call_cap,
        data_downloaded_mb: 0.into(),
        data_limit_mb: plan.data_cap_mb,
    };

    let subscription = store.insert_subscription(&subscription).await?;
    log::info!(
        "Subscription {} activated for owner {} on plan '{}' until {}",
        subscription.id,
        subscription.owner_id,
        subscription.plan_name,
        subscription.expires_at
    );
    Ok(subscription)
}

/// Moves an overdue active subscription to `expired`, deactivating its
/// credentials. Safe to call from any number of places: the transition is
/// guarded, so only one caller applies it and the rest observe the result.
pub async fn reconcile_expiry(
    store: &dyn Store,
    subscription: Subscription,
    now: DateTime<Utc>,
) -> Res<Subscription> {
    if !subscription.is_overdue(now) {
        return Ok(subscription);
    }

    let change = StatusChange::expire(SubscriptionStatus::Active, now);
    let outcome = store.transition_subscription(subscription.id, &change).await?;
    if let TransitionOutcome::Applied {
        subscription,
        credentials_deactivated,
    } = &outcome
    {
        log::info!(
            "Subscription {} expired, {} credential(s) deactivated",
            subscription.id,
            credentials_deactivated
        );
    }
    Ok(outcome.into_subscription())
}

/// Gets a subscription owned by `owner_id`, reconciled.
///
/// # Returns
///
/// `NotFound` when the id is unknown or belongs to someone else.
pub async fn get_owned(
    store: &dyn Store,
    owner_id: Uuid,
    subscription_id: Uuid,
    now: DateTime<Utc>,
) -> Res<Subscription> {
    let subscription = store
        .get_subscription(subscription_id)
        .await?
        .filter(|s| s.owner_id == owner_id)
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
    reconcile_expiry(store, subscription, now).await
}

/// All of an owner's subscriptions, newest first, each reconciled.
pub async fn list_owned(
    store: &dyn Store,
    owner_id: Uuid,
    now: DateTime<Utc>,
) -> Res<Vec<Subscription>> {
    let mut reconciled = Vec::new();
    for subscription in store.list_subscriptions(owner_id).await? {
        reconciled.push(reconcile_expiry(store, subscription, now).await?);
    }
    Ok(reconciled)
}

async fn transition_owned(
    store: &dyn Store,
    owner_id: Uuid,
    subscription_id: Uuid,
    change: StatusChange,
    verb: &str,
) -> Res<Subscription> {
    let current = get_owned(store, owner_id, subscription_id, change.at).await?;
    if !change.permits(&current) {
        return Err(invalid(verb, current.status));
    }

    match store.transition_subscription(subscription_id, &change).await? {
        TransitionOutcome::Applied {
            subscription,
            credentials_deactivated,
        } => {
            log::info!(
                "Subscription {} is now {} ({} credential(s) deactivated)",
                subscription.id,
                subscription.status,
                credentials_deactivated
            );
            Ok(subscription)
        }
        TransitionOutcome::Rejected { current } => Err(invalid(verb, current.status)),
    }
}

fn invalid(verb: &str, status: SubscriptionStatus) -> AppError {
    AppError::InvalidTransition(format!("Cannot {} a subscription that is {}", verb, status))
}

/// `active -> paused`. The deadline keeps running while paused.
pub async fn pause(
    store: &dyn Store,
    owner_id: Uuid,
    subscription_id: Uuid,
    now: DateTime<Utc>,
) -> Res<Subscription> {
    let change = StatusChange::new(&[SubscriptionStatus::Active], SubscriptionStatus::Paused, now);
    transition_owned(store, owner_id, subscription_id, change, "pause").await
}

/// `paused -> active` while the deadline has not passed. A paused
/// subscription whose deadline passed is expired instead, and returned as such.
pub async fn resume(
    store: &dyn Store,
    owner_id: Uuid,
    subscription_id: Uuid,
    now: DateTime<Utc>,
) -> Res<Subscription> {
    let current = get_owned(store, owner_id, subscription_id, now).await?;
    if current.status != SubscriptionStatus::Paused {
        return Err(invalid("resume", current.status));
    }

    if now >= current.expires_at {
        let change = StatusChange::expire(SubscriptionStatus::Paused, now);
        let outcome = store.transition_subscription(subscription_id, &change).await?;
        if outcome.is_applied() {
            log::info!(
                "Subscription {} passed its deadline while paused, expired on resume",
                subscription_id
            );
        }
        return Ok(outcome.into_subscription());
    }

    let change = StatusChange::new(&[SubscriptionStatus::Paused], SubscriptionStatus::Active, now);
    transition_owned(store, owner_id, subscription_id, change, "resume").await
}

/// `active | paused -> cancelled`, deactivating every credential of the subscription.
pub async fn cancel(
    store: &dyn Store,
    owner_id: Uuid,
    subscription_id: Uuid,
    now: DateTime<Utc>,
) -> Res<Subscription> {
    let change = StatusChange::new(
        &[SubscriptionStatus::Active, SubscriptionStatus::Paused],
        SubscriptionStatus::Cancelled,
        now,
    );
    transition_owned(store, owner_id, subscription_id, change, "cancel").await
}

/// Expires every overdue subscription, then deactivates credentials whose own
/// deadline has passed. Runs the same guarded transition as request-time reads.
pub async fn sweep_expired(store: &dyn Store, now: DateTime<Utc>) -> Res<SweepReport> {
    let mut report = SweepReport::default();

    for subscription in store.list_overdue_subscriptions(now).await? {
        let change = StatusChange::expire(SubscriptionStatus::Active, now);
        if let TransitionOutcome::Applied {
            credentials_deactivated,
            ..
        } = store.transition_subscription(subscription.id, &change).await?
        {
            report.subscriptions_expired += 1;
            report.credentials_deactivated += credentials_deactivated;
        }
    }

    report.credentials_deactivated += store.deactivate_expired_credentials(now).await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, sync::Arc};

    use bigdecimal::BigDecimal;
    use chrono::Duration;
    use db::{memory::MemoryStore, models::credential::Credential};

    use super::*;
    use crate::services::plan::{self, tests::basic_request};

    async fn setup(store: &MemoryStore, now: DateTime<Utc>) -> Subscription {
        let plan = plan::create_plan(store, basic_request(), now).await.unwrap();
        let payment = PaymentConfirmed {
            owner_id: Uuid::new_v4(),
            plan_id: plan.id,
            duration_key: "2-hours".to_string(),
            amount_charged: Some(BigDecimal::from_str("19.99").unwrap()),
        };
        create_from_payment(store, payment, now).await.unwrap()
    }

    async fn add_credential(store: &MemoryStore, sub: &Subscription, name: &str) -> Credential {
        let credential = Credential {
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
        };
        store.insert_credential(&credential, 5, None).await.unwrap()
    }

    #[tokio::test]
    async fn payment_creates_snapshot_of_plan() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = setup(&store, now).await;

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.total_cost, BigDecimal::from_str("19.99").unwrap());
        assert_eq!(sub.api_calls_limit, 1000);
        assert_eq!(sub.data_limit_mb, 100);
        assert_eq!(sub.expires_at, now + Duration::hours(2));
        assert_eq!(sub.api_calls_made, 0);

        plan::set_plan_active(&store, sub.plan_id, false).await.unwrap();
        let stored = get_owned(&store, sub.owner_id, sub.id, now).await.unwrap();
        assert_eq!(stored.api_calls_limit, 1000);
    }

    #[tokio::test]
    async fn inactive_plan_and_unknown_duration_are_rejected() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let plan = plan::create_plan(&store, basic_request(), now).await.unwrap();

        let payment = |key: &str| PaymentConfirmed {
            owner_id: Uuid::new_v4(),
            plan_id: plan.id,
            duration_key: key.to_string(),
            amount_charged: None,
        };

        assert!(matches!(
            create_from_payment(&store, payment("3-days"), now).await,
            Err(AppError::InvalidDuration(_))
        ));

        plan::set_plan_active(&store, plan.id, false).await.unwrap();
        assert!(matches!(
            create_from_payment(&store, payment("2-hours"), now).await,
            Err(AppError::PlanInactive)
        ));
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_and_cascades() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = setup(&store, now).await;
        let cred = add_credential(&store, &sub, "main").await;

        let later = sub.expires_at + Duration::seconds(1);
        let once = reconcile_expiry(&store, sub.clone(), later).await.unwrap();
        let twice = reconcile_expiry(&store, once.clone(), later).await.unwrap();
        let stale = reconcile_expiry(&store, sub.clone(), later).await.unwrap();

        assert_eq!(once.status, SubscriptionStatus::Expired);
        assert_eq!(once, twice);
        assert_eq!(once, stale);

        let cred = store.get_credential(cred.credential_id).await.unwrap().unwrap();
        assert!(!cred.is_active);
    }

    #[tokio::test]
    async fn reconcile_before_deadline_changes_nothing() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = setup(&store, now).await;
        let same = reconcile_expiry(&store, sub.clone(), now + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(same, sub);
    }

    #[tokio::test]
    async fn pause_then_resume_keeps_deadline() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = setup(&store, now).await;

        let paused = pause(&store, sub.owner_id, sub.id, now + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(paused.status, SubscriptionStatus::Paused);
        assert!(paused.paused_at.is_some());

        let resumed = resume(&store, sub.owner_id, sub.id, now + Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(resumed.status, SubscriptionStatus::Active);
        assert_eq!(resumed.expires_at, sub.expires_at);
        assert_eq!(resumed.paused_at, None);
    }

    #[tokio::test]
    async fn resume_after_deadline_expires() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = setup(&store, now).await;
        pause(&store, sub.owner_id, sub.id, now).await.unwrap();

        let result = resume(&store, sub.owner_id, sub.id, sub.expires_at).await.unwrap();
        assert_eq!(result.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn invalid_transitions_are_reported() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = setup(&store, now).await;

        assert!(matches!(
            resume(&store, sub.owner_id, sub.id, now).await,
            Err(AppError::InvalidTransition(_))
        ));

        cancel(&store, sub.owner_id, sub.id, now).await.unwrap();
        for result in [
            pause(&store, sub.owner_id, sub.id, now).await,
            resume(&store, sub.owner_id, sub.id, now).await,
            cancel(&store, sub.owner_id, sub.id, now).await,
        ] {
            assert!(matches!(result, Err(AppError::InvalidTransition(_))));
        }
    }

    #[tokio::test]
    async fn pause_past_deadline_sees_expired() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = setup(&store, now).await;
        assert!(matches!(
            pause(&store, sub.owner_id, sub.id, sub.expires_at).await,
            Err(AppError::InvalidTransition(_))
        ));
        let stored = store.get_subscription(sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn cancel_deactivates_credentials() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = setup(&store, now).await;
        let a = add_credential(&store, &sub, "a").await;
        let b = add_credential(&store, &sub, "b").await;
        pause(&store, sub.owner_id, sub.id, now).await.unwrap();

        let cancelled = cancel(&store, sub.owner_id, sub.id, now).await.unwrap();
        assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
        assert_eq!(cancelled.cancelled_at, Some(now));
        for id in [a.credential_id, b.credential_id] {
            assert!(!store.get_credential(id).await.unwrap().unwrap().is_active);
        }
    }

    #[tokio::test]
    async fn other_owners_see_not_found() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = setup(&store, now).await;
        let stranger = Uuid::new_v4();

        assert!(matches!(
            get_owned(&store, stranger, sub.id, now).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            cancel(&store, stranger, sub.id, now).await,
            Err(AppError::NotFound(_))
        ));
        assert!(list_owned(&store, stranger, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_expires_and_counts() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = setup(&store, now).await;
        add_credential(&store, &sub, "main").await;
        let fresh = setup(&store, now + Duration::hours(1)).await;

        let report = sweep_expired(&store, sub.expires_at).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                subscriptions_expired: 1,
                credentials_deactivated: 1,
            }
        );

        let again = sweep_expired(&store, sub.expires_at).await.unwrap();
        assert_eq!(again, SweepReport::default());
        let fresh = store.get_subscription(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, SubscriptionStatus::Active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancel_racing_the_sweep_has_one_winner() {
        for _ in 0..20 {
            let store = Arc::new(MemoryStore::new());
            let now = Utc::now();
            let sub = setup(&store, now).await;
            add_credential(&store, &sub, "a").await;
            add_credential(&store, &sub, "b").await;
            let deadline = sub.expires_at;
            let (owner_id, sub_id) = (sub.owner_id, sub.id);

            let cancelling = {
                let store = store.clone();
                tokio::spawn(async move { cancel(&*store, owner_id, sub_id, now).await })
            };
            let sweeping = {
                let store = store.clone();
                tokio::spawn(async move { sweep_expired(&*store, deadline).await })
            };
            let reconciling = {
                let store = store.clone();
                let sub = sub.clone();
                tokio::spawn(async move { reconcile_expiry(&*store, sub, deadline).await })
            };

            let cancelled = cancelling.await.unwrap();
            let report = sweeping.await.unwrap().unwrap();
            let reconciled = reconciling.await.unwrap().unwrap();
            let stored = store.get_subscription(sub.id).await.unwrap().unwrap();

            match cancelled {
                Ok(cancelled) => {
                    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
                    assert_eq!(stored.status, SubscriptionStatus::Cancelled);
                    assert_eq!(report.subscriptions_expired, 0);
                }
                Err(err) => {
                    assert!(matches!(err, AppError::InvalidTransition(_)));
                    assert_eq!(stored.status, SubscriptionStatus::Expired);
                }
            }
            assert!(reconciled.status.is_terminal());
            assert!(report.subscriptions_expired <= 1);

            let credentials = store.list_credentials(sub.owner_id, Some(sub.id)).await.unwrap();
            assert_eq!(credentials.len(), 2);
            assert!(credentials.iter().all(|c| !c.is_active));
        }
    }
}
