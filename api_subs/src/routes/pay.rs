use std::sync::Arc;

use actix_web::{Responder, post, web};
use chrono::Utc;
use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
};
use db::store::SharedStore;
use serde_json::json;

use crate::services;

/// Handles Stripe webhook events confirming a purchase.
///
/// # Input
/// - `payload`: Raw string containing the webhook event data
/// - `req`: HTTP request containing Stripe signature in headers
/// - `config`: Application configuration with webhook secret
///
/// # Output
/// - Success: 200 OK, with the id of the subscription created for a completed checkout
/// - Error: 400 Bad Request for an invalid signature or checkout metadata,
///   404/422 when the plan is unknown, retired or does not offer the duration
///
/// # Note
/// This endpoint is called by Stripe, not by the frontend. The checkout
/// session must carry `owner_id`, `plan_id` and `duration_key` metadata.
#[post("/webhook")]
pub async fn post_webhook(
    payload: String,
    req: actix_web::HttpRequest,
    config: web::Data<Arc<Config>>,
    store: web::Data<SharedStore>,
) -> Res<impl Responder> {
    let signature = match req.headers().get("stripe-signature") {
        Some(signature) => signature.to_str().unwrap_or(""),
        None => return Err(AppError::BadRequest("Stripe signature missing".to_string())),
    };

    let event = services::pay::construct_event(&payload, signature, &config.stripe_webhook_secret)?;
    let created =
        services::pay::process_webhook_event(&***store, event, Utc::now()).await?;

    Success::ok(json!({
        "received": true,
        "subscription_id": created.map(|s| s.id),
    }))
}
