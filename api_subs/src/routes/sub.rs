use actix_web::{Responder, get, post, web};
use chrono::Utc;
use common::{error::Res, http::Success, jwt::JwtClaims};
use db::store::SharedStore;
use uuid::Uuid;

use crate::{
    dtos::sub::{SubscriptionListResponse, SubscriptionView},
    services,
};

/// Lists the caller's subscriptions, reconciled, newest first.
///
/// # Arguments
///
/// * `claims` - The JWT claims of the authenticated user.
/// * `store` - The persistence handle.
///
/// # Returns
///
/// A `Result` containing a `Success` response with the subscriptions or an `AppError` if an error occurs.
#[get("/subscriptions")]
pub async fn get_subscriptions(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<SharedStore>,
) -> Res<impl Responder> {
    let now = Utc::now();
    let subscriptions = services::sub::list_owned(&***store, claims.user_id, now)
        .await?
        .into_iter()
        .map(|s| SubscriptionView::new(s, now))
        .collect();
    Success::ok(SubscriptionListResponse { subscriptions })
}

/// Retrieves one of the caller's subscriptions.
///
/// # Returns
///
/// `404` when the subscription does not exist or belongs to someone else.
#[get("/subscriptions/{subscription_id}")]
pub async fn get_subscription(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<SharedStore>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let now = Utc::now();
    let sub = services::sub::get_owned(&***store, claims.user_id, path.into_inner(), now).await?;
    Success::ok(SubscriptionView::new(sub, now))
}

/// Pauses an active subscription. The deadline is not extended.
#[post("/subscriptions/{subscription_id}/pause")]
pub async fn post_pause(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<SharedStore>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let now = Utc::now();
    let sub = services::sub::pause(&***store, claims.user_id, path.into_inner(), now).await?;
    Success::ok(SubscriptionView::new(sub, now))
}

/// Resumes a paused subscription, or reports it expired when its deadline passed.
#[post("/subscriptions/{subscription_id}/resume")]
pub async fn post_resume(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<SharedStore>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let now = Utc::now();
    let sub = services::sub::resume(&***store, claims.user_id, path.into_inner(), now).await?;
    Success::ok(SubscriptionView::new(sub, now))
}

/// Cancels a subscription and deactivates its credentials.
#[post("/subscriptions/{subscription_id}/cancel")]
pub async fn post_cancel(
    claims: web::ReqData<JwtClaims>,
    store: web::Data<SharedStore>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let now = Utc::now();
    let sub = services::sub::cancel(&***store, claims.user_id, path.into_inner(), now).await?;
    Success::ok(SubscriptionView::new(sub, now))
}
