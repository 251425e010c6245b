use std::sync::Arc;

use actix_web::{Responder, get, web};
use chrono::Utc;
use common::{env_config::Config, error::Res, http::Success, jwt::JwtClaims};
use db::store::SharedStore;
use uuid::Uuid;

use crate::{
    dtos::usage::{SummaryQuery, UsageRangeQuery},
    service,
};

/// Daily usage of one of the caller's subscriptions.
///
/// # Arguments
///
/// * `config` - Supplies the default window when `start` is omitted.
/// * `claims` - The JWT claims of the authenticated user.
/// * `store` - The persistence handle.
/// * `query` - Optional inclusive `start` and `end` dates. `end` defaults to today.
///
/// # Returns
///
/// A `Result` containing a `Success` response with the zero-filled series and cap percentages.
#[get("/{subscription_id}")]
pub async fn get_subscription_usage(
    config: web::Data<Arc<Config>>,
    claims: web::ReqData<JwtClaims>,
    store: web::Data<SharedStore>,
    path: web::Path<Uuid>,
    query: web::Query<UsageRangeQuery>,
) -> Res<impl Responder> {
    let now = Utc::now();
    let (default_start, default_end) = service::ledger::window(now, config.dashboard_window_days)?;
    let end = query.end.unwrap_or(default_end);
    let start = query
        .start
        .unwrap_or_else(|| end - (default_end - default_start));

    let usage = service::ledger::subscription_usage(
        &***store,
        claims.user_id,
        path.into_inner(),
        start,
        end,
        now,
    )
    .await?;
    Success::ok(usage)
}

/// The caller's dashboard summary.
#[get("")]
pub async fn get_summary(
    config: web::Data<Arc<Config>>,
    claims: web::ReqData<JwtClaims>,
    store: web::Data<SharedStore>,
    query: web::Query<SummaryQuery>,
) -> Res<impl Responder> {
    let window_days = query.window_days.unwrap_or(config.dashboard_window_days);
    let summary =
        service::dashboard::summary(&***store, claims.user_id, window_days, Utc::now()).await?;
    Success::ok(summary)
}
