use chrono::{DateTime, Utc};
use common::{
    env_config::CredentialConfig,
    error::{AppError, Res},
    key::{CredentialScope, KeyClaims},
    misc::{generate_secret, hash_str, verify_hash},
};
use db::{
    models::{credential::Credential, subscription::Subscription},
    store::Store,
};
use uuid::Uuid;

use crate::dtos::key::{ApiKeyListItem, CreateKeyRequest, CreateKeyResponse};

/// Retrieves credential metadata for an owner.
///
/// # Arguments
///
/// * `store` - The persistence handle.
/// * `owner_id` - The ID of the owner whose credentials are listed.
/// * `subscription_id` - Optionally narrow the list to one subscription.
///
/// # Returns
///
/// A `Result` containing a vector of `ApiKeyListItem` objects or an `AppError` if an error occurs.
pub async fn get_keys(
    store: &dyn Store,
    owner_id: Uuid,
    subscription_id: Option<Uuid>,
) -> Res<Vec<ApiKeyListItem>> {
    let credentials = store.list_credentials(owner_id, subscription_id).await?;
    Ok(credentials.into_iter().map(ApiKeyListItem::from).collect())
}

/// Mints a new credential against one of the owner's subscriptions.
///
/// # Arguments
///
/// * `store` - The persistence handle.
/// * `config` - Signing secret and per-subscription quota.
/// * `owner_id` - The ID of the owner creating the credential.
/// * `req` - Target subscription and credential name.
/// * `now` - Issue instant.
///
/// # Returns
///
/// The raw credential (shown only this once) with its metadata, or
/// `SubscriptionNotEligible`, `QuotaExceeded` or `DuplicateName`.
pub async fn create_key(
    store: &dyn Store,
    config: &CredentialConfig,
    owner_id: Uuid,
    req: CreateKeyRequest,
    now: DateTime<Utc>,
) -> Res<CreateKeyResponse> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Credential name is required".to_string()));
    }

    let subscription =
        api_subs::services::sub::get_owned(store, owner_id, req.subscription_id, now).await?;
    issue(store, config, &subscription, name, None, now).await
}

/// Revokes a credential. Revoking an inactive credential succeeds without change.
///
/// # Returns
///
/// The credential metadata, or `NotFound` when it does not belong to `owner_id`.
pub async fn revoke_key(
    store: &dyn Store,
    owner_id: Uuid,
    credential_id: Uuid,
) -> Res<ApiKeyListItem> {
    let mut credential = get_owned(store, owner_id, credential_id).await?;

    if store.deactivate_credential(credential_id).await? {
        log::info!("Credential {} revoked by owner {}", credential_id, owner_id);
    }
    credential.is_active = false;
    Ok(ApiKeyListItem::from(credential))
}

/// Replaces a credential with a new one of the same name on the same
/// subscription. The old one is deactivated in the same unit of work.
///
/// # Returns
///
/// The new raw credential, or `SubscriptionNotEligible` when the subscription
/// is no longer active, `InvalidTransition` when the credential is already inactive.
pub async fn refresh_key(
    store: &dyn Store,
    config: &CredentialConfig,
    owner_id: Uuid,
    credential_id: Uuid,
    now: DateTime<Utc>,
) -> Res<CreateKeyResponse> {
    let credential = get_owned(store, owner_id, credential_id).await?;
    let subscription =
        api_subs::services::sub::get_owned(store, owner_id, credential.subscription_id, now).await?;

    if !subscription.is_eligible(now) {
        return Err(AppError::SubscriptionNotEligible(format!(
            "Subscription is {}",
            subscription.status
        )));
    }
    if !credential.is_active {
        return Err(AppError::InvalidTransition(
            "Cannot refresh an inactive credential".to_string(),
        ));
    }

    let refreshed = issue(
        store,
        config,
        &subscription,
        &credential.name,
        Some(credential.credential_id),
        now,
    )
    .await?;
    log::info!(
        "Credential {} refreshed as {}",
        credential.credential_id,
        refreshed.credential.credential_id
    );
    Ok(refreshed)
}

/// Decodes a raw credential and checks it against its stored record.
///
/// # Returns
///
/// The scope the credential grants, or one of `CredentialMalformed`,
/// `CredentialUnknown`, `CredentialExpired`, `CredentialRevoked`.
pub async fn verify_key(
    store: &dyn Store,
    signing_secret: &str,
    raw: &str,
    now: DateTime<Utc>,
) -> Res<CredentialScope> {
    let claims = KeyClaims::from_key(raw.trim(), signing_secret)?;
    verify_claims(store, &claims, now).await
}

/// Verification for claims that were already decoded from a request header.
pub async fn verify_claims(
    store: &dyn Store,
    claims: &KeyClaims,
    now: DateTime<Utc>,
) -> Res<CredentialScope> {
    let credential = store
        .get_credential(claims.credential_id)
        .await?
        .filter(|c| c.subscription_id == claims.subscription_id && c.owner_id == claims.owner_id)
        .ok_or(AppError::CredentialUnknown)?;

    if !verify_hash(&claims.secret, &credential.secret_hash) {
        return Err(AppError::CredentialUnknown);
    }

    if credential.is_expired(now) {
        reconcile_owner_subscription(store, credential.subscription_id, now).await;
        return Err(AppError::CredentialExpired);
    }
    if !credential.is_active {
        return Err(AppError::CredentialRevoked);
    }

    if let Err(e) = store.touch_credential(credential.credential_id, now).await {
        log::warn!(
            "Could not record use of credential {}: {}",
            credential.credential_id,
            e
        );
    }

    Ok(claims.scope(credential.expires_at))
}

async fn reconcile_owner_subscription(
    store: &dyn Store,
    subscription_id: Uuid,
    now: DateTime<Utc>,
) {
    let result = match store.get_subscription(subscription_id).await {
        Ok(Some(subscription)) => {
            api_subs::services::sub::reconcile_expiry(store, subscription, now)
                .await
                .map(|_| ())
        }
        Ok(None) => Ok(()),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        log::error!("Failed to reconcile subscription {}: {}", subscription_id, e);
    }
}

async fn get_owned(store: &dyn Store, owner_id: Uuid, credential_id: Uuid) -> Res<Credential> {
    store
        .get_credential(credential_id)
        .await?
        .filter(|c| c.owner_id == owner_id)
        .ok_or_else(|| AppError::NotFound("Credential not found".to_string()))
}

async fn issue(
    store: &dyn Store,
    config: &CredentialConfig,
    subscription: &Subscription,
    name: &str,
    replaces: Option<Uuid>,
    now: DateTime<Utc>,
) -> Res<CreateKeyResponse> {
    let secret = generate_secret();
    let credential_id = Uuid::new_v4();
    let expires_at = subscription.expires_at;

    let claims = KeyClaims {
        owner_id: subscription.owner_id,
        subscription_id: subscription.id,
        credential_id,
        plan_name: subscription.plan_name.clone(),
        api_calls_limit: subscription.api_calls_limit,
        data_limit_mb: subscription.data_limit_mb,
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
        secret,
    };
    let key = claims.to_key(&config.secret)?;

    let credential = Credential {
        id: Uuid::new_v4(),
        credential_id,
        owner_id: subscription.owner_id,
        subscription_id: subscription.id,
        name: name.to_string(),
        secret_hash: hash_str(&claims.secret)?,
        created_at: now,
        expires_at,
        is_active: true,
        last_used_at: None,
    };
    let credential = store
        .insert_credential(&credential, config.quota, replaces)
        .await?;

    Ok(CreateKeyResponse {
        key,
        credential: ApiKeyListItem::from(credential),
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bigdecimal::BigDecimal;
    use chrono::Duration;
    use db::{
        memory::MemoryStore,
        models::{plan::Plan, subscription::SubscriptionStatus},
    };

    use super::*;

    const SIGNING: &str = "test-signing-secret";

    fn config(quota: u32) -> CredentialConfig {
        CredentialConfig {
            secret: SIGNING.to_string(),
            quota,
        }
    }

    async fn subscription(store: &MemoryStore, now: DateTime<Utc>) -> Subscription {
        let prices = [("10-minutes", "9.99"), ("2-hours", "19.99"), ("1-week", "49.99")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), BigDecimal::from_str(v).unwrap()))
            .collect();
        let plan = store
            .insert_plan(&Plan {
                id: Uuid::new_v4(),
                name: "Basic".to_string(),
                description: String::new(),
                prices,
                api_call_cap: 1000,
                data_cap_mb: 100,
                is_active: true,
                created_at: now,
            })
            .await
            .unwrap();
        api_subs::services::sub::create_from_payment(
            store,
            api_subs::dtos::pay::PaymentConfirmed {
                owner_id: Uuid::new_v4(),
                plan_id: plan.id,
                duration_key: "2-hours".to_string(),
                amount_charged: None,
            },
            now,
        )
        .await
        .unwrap()
    }

    fn request(sub: &Subscription, name: &str) -> CreateKeyRequest {
        CreateKeyRequest {
            subscription_id: sub.id,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn minted_key_verifies_to_its_scope() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = subscription(&store, now).await;

        let minted = create_key(&store, &config(5), sub.owner_id, request(&sub, "main"), now)
            .await
            .unwrap();
        let scope = verify_key(&store, SIGNING, &minted.key, now).await.unwrap();

        assert_eq!(scope.owner_id, sub.owner_id);
        assert_eq!(scope.subscription_id, sub.id);
        assert_eq!(scope.credential_id, minted.credential.credential_id);
        assert_eq!(scope.api_calls_limit, 1000);
        assert_eq!(scope.data_limit_mb, 100);
        assert_eq!(scope.plan_name, "Basic");
        assert_eq!(scope.expires_at, sub.expires_at);

        let stored = store
            .get_credential(minted.credential.credential_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_used_at, Some(now));
        assert_ne!(stored.secret_hash, "");
    }

    #[tokio::test]
    async fn quota_then_revoke_then_mint() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = subscription(&store, now).await;
        let cfg = config(2);

        let first = create_key(&store, &cfg, sub.owner_id, request(&sub, "a"), now).await.unwrap();
        create_key(&store, &cfg, sub.owner_id, request(&sub, "b"), now).await.unwrap();
        assert!(matches!(
            create_key(&store, &cfg, sub.owner_id, request(&sub, "c"), now).await,
            Err(AppError::QuotaExceeded(2))
        ));

        revoke_key(&store, sub.owner_id, first.credential.credential_id)
            .await
            .unwrap();
        assert!(create_key(&store, &cfg, sub.owner_id, request(&sub, "c"), now).await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_active_name_is_rejected() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = subscription(&store, now).await;
        let cfg = config(5);

        let first = create_key(&store, &cfg, sub.owner_id, request(&sub, "ci"), now).await.unwrap();
        assert!(matches!(
            create_key(&store, &cfg, sub.owner_id, request(&sub, "ci"), now).await,
            Err(AppError::DuplicateName(_))
        ));

        revoke_key(&store, sub.owner_id, first.credential.credential_id).await.unwrap();
        assert!(create_key(&store, &cfg, sub.owner_id, request(&sub, "ci"), now).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_is_idempotent_and_owner_scoped() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = subscription(&store, now).await;
        let minted = create_key(&store, &config(5), sub.owner_id, request(&sub, "a"), now)
            .await
            .unwrap();
        let id = minted.credential.credential_id;

        assert!(matches!(
            revoke_key(&store, Uuid::new_v4(), id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(!revoke_key(&store, sub.owner_id, id).await.unwrap().is_active);
        assert!(!revoke_key(&store, sub.owner_id, id).await.unwrap().is_active);

        assert!(matches!(
            verify_key(&store, SIGNING, &minted.key, now).await,
            Err(AppError::CredentialRevoked)
        ));
    }

    #[tokio::test]
    async fn refresh_replaces_and_never_outlives_subscription() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = subscription(&store, now).await;
        let cfg = config(1);
        let old = create_key(&store, &cfg, sub.owner_id, request(&sub, "ci"), now).await.unwrap();

        let later = now + Duration::minutes(30);
        let new = refresh_key(&store, &cfg, sub.owner_id, old.credential.credential_id, later)
            .await
            .unwrap();

        assert_eq!(new.credential.name, "ci");
        assert!(new.credential.expires_at <= sub.expires_at);
        assert_ne!(new.credential.credential_id, old.credential.credential_id);
        assert!(matches!(
            verify_key(&store, SIGNING, &old.key, later).await,
            Err(AppError::CredentialRevoked)
        ));
        assert!(verify_key(&store, SIGNING, &new.key, later).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_after_cancel_is_not_eligible() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = subscription(&store, now).await;
        let cfg = config(5);
        let old = create_key(&store, &cfg, sub.owner_id, request(&sub, "ci"), now).await.unwrap();

        pause_and_cancel(&store, &sub, now).await;
        let result =
            refresh_key(&store, &cfg, sub.owner_id, old.credential.credential_id, now).await;
        assert!(matches!(result, Err(AppError::SubscriptionNotEligible(_))));

        let other = create_key(&store, &cfg, sub.owner_id, request(&sub, "other"), now).await;
        assert!(matches!(other, Err(AppError::SubscriptionNotEligible(_))));
    }

    async fn pause_and_cancel(store: &MemoryStore, sub: &Subscription, now: DateTime<Utc>) {
        api_subs::services::sub::pause(store, sub.owner_id, sub.id, now).await.unwrap();
        api_subs::services::sub::cancel(store, sub.owner_id, sub.id, now).await.unwrap();
    }

    #[tokio::test]
    async fn mint_after_deadline_fails_and_cascades() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = subscription(&store, now).await;
        let cfg = config(5);
        let existing = create_key(&store, &cfg, sub.owner_id, request(&sub, "a"), now)
            .await
            .unwrap();

        let late = sub.expires_at + Duration::seconds(1);
        assert!(matches!(
            create_key(&store, &cfg, sub.owner_id, request(&sub, "b"), late).await,
            Err(AppError::SubscriptionNotEligible(_))
        ));

        let stored = store
            .get_credential(existing.credential.credential_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_active);
        let sub = store.get_subscription(sub.id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn refreshing_a_revoked_credential_is_rejected() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = subscription(&store, now).await;
        let cfg = config(5);
        let old = create_key(&store, &cfg, sub.owner_id, request(&sub, "ci"), now).await.unwrap();
        revoke_key(&store, sub.owner_id, old.credential.credential_id).await.unwrap();

        assert!(matches!(
            refresh_key(&store, &cfg, sub.owner_id, old.credential.credential_id, now).await,
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn paused_subscription_blocks_minting() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = subscription(&store, now).await;
        api_subs::services::sub::pause(&store, sub.owner_id, sub.id, now).await.unwrap();

        assert!(matches!(
            create_key(&store, &config(5), sub.owner_id, request(&sub, "a"), now).await,
            Err(AppError::SubscriptionNotEligible(_))
        ));
    }

    #[tokio::test]
    async fn verification_errors_are_distinct() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = subscription(&store, now).await;
        let minted = create_key(&store, &config(5), sub.owner_id, request(&sub, "a"), now)
            .await
            .unwrap();

        assert!(matches!(
            verify_key(&store, SIGNING, "sk_not-a-token", now).await,
            Err(AppError::CredentialMalformed(_))
        ));
        assert!(matches!(
            verify_key(&store, "other-secret", &minted.key, now).await,
            Err(AppError::CredentialMalformed(_))
        ));

        let mut forged = KeyClaims::from_key(&minted.key, SIGNING).unwrap();
        forged.credential_id = Uuid::new_v4();
        let forged = forged.to_key(SIGNING).unwrap();
        assert!(matches!(
            verify_key(&store, SIGNING, &forged, now).await,
            Err(AppError::CredentialUnknown)
        ));

        assert!(matches!(
            verify_key(&store, SIGNING, &minted.key, sub.expires_at).await,
            Err(AppError::CredentialExpired)
        ));
        let sub = store.get_subscription(sub.id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn listing_hides_other_owners_and_filters_by_subscription() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let sub = subscription(&store, now).await;
        create_key(&store, &config(5), sub.owner_id, request(&sub, "a"), now).await.unwrap();

        assert_eq!(get_keys(&store, sub.owner_id, None).await.unwrap().len(), 1);
        assert_eq!(get_keys(&store, sub.owner_id, Some(sub.id)).await.unwrap().len(), 1);
        assert!(get_keys(&store, sub.owner_id, Some(Uuid::new_v4())).await.unwrap().is_empty());
        assert!(get_keys(&store, Uuid::new_v4(), None).await.unwrap().is_empty());
    }
}
