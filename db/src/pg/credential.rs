use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::credential::Credential;

pub async fn get_credential_by_credential_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    credential_id: Uuid,
) -> Res<Option<Credential>> {
    sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE credential_id = $1")
        .bind(credential_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_credentials_by_owner<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    owner_id: Uuid,
    subscription_id: Option<Uuid>,
) -> Res<Vec<Credential>> {
    sqlx::query_as::<_, Credential>(
        r#"
        SELECT * FROM credentials
        WHERE owner_id = $1 AND ($2::uuid IS NULL OR subscription_id = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(owner_id)
    .bind(subscription_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn get_active_credentials_by_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_id: Uuid,
) -> Res<Vec<Credential>> {
    sqlx::query_as::<_, Credential>(
        "SELECT * FROM credentials WHERE subscription_id = $1 AND is_active",
    )
    .bind(subscription_id)
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

pub async fn insert_credential<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    credential: &Credential,
) -> Res<Credential> {
    sqlx::query_as::<_, Credential>(
        r#"
        INSERT INTO credentials (
            id, credential_id, owner_id, subscription_id, name, secret_hash,
            created_at, expires_at, is_active, last_used_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(credential.id)
    .bind(credential.credential_id)
    .bind(credential.owner_id)
    .bind(credential.subscription_id)
    .bind(&credential.name)
    .bind(&credential.secret_hash)
    .bind(credential.created_at)
    .bind(credential.expires_at)
    .bind(credential.is_active)
    .bind(credential.last_used_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

/// Returns the number of rows that went from active to inactive.
pub async fn deactivate_credential<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    credential_id: Uuid,
) -> Res<u64> {
    let result = sqlx::query(
        "UPDATE credentials SET is_active = FALSE WHERE credential_id = $1 AND is_active",
    )
    .bind(credential_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn deactivate_credentials_by_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_id: Uuid,
) -> Res<u64> {
    let result = sqlx::query(
        "UPDATE credentials SET is_active = FALSE WHERE subscription_id = $1 AND is_active",
    )
    .bind(subscription_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn deactivate_expired_credentials<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    now: DateTime<Utc>,
) -> Res<u64> {
    let result = sqlx::query(
        "UPDATE credentials SET is_active = FALSE WHERE is_active AND expires_at <= $1",
    )
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn update_last_used<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    credential_id: Uuid,
    at: DateTime<Utc>,
) -> Res<()> {
    sqlx::query("UPDATE credentials SET last_used_at = $1 WHERE credential_id = $2")
        .bind(at)
        .bind(credential_id)
        .execute(executor)
        .await?;
    Ok(())
}
