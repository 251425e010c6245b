use std::sync::Arc;

use actix_web::{
    Responder, get, post,
    web::{self},
};
use chrono::Utc;
use common::{env_config::Config, error::Res, http::Success, jwt::JwtClaims};
use db::store::SharedStore;

use crate::{
    dtos::key::{CreateKeyRequest, KeyListQuery, RefreshKeyRequest, RevokeKeyRequest},
    service,
};

/// Retrieves credential metadata for the authenticated user.
///
/// # Arguments
///
/// * `claims` - The JWT claims of the authenticated user.
/// * `store` - The persistence handle.
/// * `query` - Optional `subscription_id` filter.
///
/// # Returns
///
/// A `Result` containing a `Success` response with the list of credentials or an `AppError` if an error occurs.
#[get("/keys")]
pub async fn get_keys(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<SharedStore>,
    query: web::Query<KeyListQuery>,
) -> Res<impl Responder> {
    let keys = service::key::get_keys(&***store, claims.user_id, query.subscription_id).await?;
    Success::ok(keys)
}

/// Mints a new credential against one of the caller's subscriptions.
///
/// # Arguments
///
/// * `config` - The application configuration.
/// * `claims` - The JWT claims of the authenticated user.
/// * `store` - The persistence handle.
/// * `req` - Subscription id and credential name.
///
/// # Returns
///
/// A `Result` containing a `Success` response with the raw credential, shown only once.
#[post("/generate")]
pub async fn post_generate_key(
    config: web::Data<Arc<Config>>,
    claims: web::ReqData<JwtClaims>,
    store: web::Data<SharedStore>,
    req: web::Json<CreateKeyRequest>,
) -> Res<impl Responder> {
    let key = service::key::create_key(
        &***store,
        &config.credential_config,
        claims.user_id,
        req.into_inner(),
        Utc::now(),
    )
    .await?;
    Success::created(key)
}

/// Revokes one of the caller's credentials. Repeating the call is harmless.
///
/// # Arguments
///
/// * `claims` - The JWT claims of the authenticated user.
/// * `store` - The persistence handle.
/// * `req` - The request containing the credential id to revoke.
///
/// # Returns
///
/// A `Result` containing a `Success` response with the revoked credential or an `AppError` if an error occurs.
#[post("/revoke")]
pub async fn post_revoke(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<SharedStore>,
    req: web::Json<RevokeKeyRequest>,
) -> Res<impl Responder> {
    let key = service::key::revoke_key(&***store, claims.user_id, req.credential_id).await?;
    Success::ok(key)
}

/// Replaces one of the caller's credentials with a fresh one of the same name.
#[post("/refresh")]
pub async fn post_refresh(
    config: web::Data<Arc<Config>>,
    claims: web::ReqData<JwtClaims>,
    store: web::Data<SharedStore>,
    req: web::Json<RefreshKeyRequest>,
) -> Res<impl Responder> {
    let key = service::key::refresh_key(
        &***store,
        &config.credential_config,
        claims.user_id,
        req.credential_id,
        Utc::now(),
    )
    .await?;
    Success::created(key)
}
