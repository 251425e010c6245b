use actix_web::{Responder, get, web};
use common::{error::Res, http::Success};
use db::store::SharedStore;
use uuid::Uuid;

use crate::{dtos::plan::PlanListQuery, services};

/// Lists purchasable plans.
///
/// # Arguments
///
/// * `store` - The persistence handle.
/// * `query` - `include_inactive=true` also returns retired plans.
///
/// # Returns
///
/// A `Result` containing a `Success` response with the plans or an `AppError` if an error occurs.
#[get("")]
pub async fn get_plans(
    store: web::Data<SharedStore>,
    query: web::Query<PlanListQuery>,
) -> Res<impl Responder> {
    let active_only = !query.include_inactive.unwrap_or(false);
    let plans = services::plan::list_plans(&***store, active_only).await?;
    Success::ok(plans)
}

/// Retrieves a single plan by id.
#[get("/{plan_id}")]
pub async fn get_plan(
    store: web::Data<SharedStore>,
    path: web::Path<Uuid>,
) -> Res<impl Responder> {
    let plan = services::plan::get_plan(&***store, path.into_inner()).await?;
    Success::ok(plan)
}
