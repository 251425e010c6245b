use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use db::{models::plan::Plan, store::Store};
use uuid::Uuid;

use crate::dtos::plan::PlanCreateRequest;

/// Lists catalog plans.
///
/// # Arguments
///
/// * `store` - The persistence handle.
/// * `active_only` - Hide retired plans when `true`.
///
/// # Returns
///
/// Plans ordered by name.
pub async fn list_plans(store: &dyn Store, active_only: bool) -> Res<Vec<Plan>> {
    store.list_plans(active_only).await
}

/// Gets one plan or `NotFound`.
pub async fn get_plan(store: &dyn Store, plan_id: Uuid) -> Res<Plan> {
    store
        .get_plan(plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))
}

/// Validates and stores a new plan.
///
/// # Arguments
///
/// * `store` - The persistence handle.
/// * `req` - Name, price table and caps of the new plan.
/// * `now` - Creation instant.
///
/// # Returns
///
/// The stored plan, or `BadRequest`/`InvalidDuration` when the price table
/// does not cover exactly the offered durations.
pub async fn create_plan(
    store: &dyn Store,
    req: PlanCreateRequest,
    now: DateTime<Utc>,
) -> Res<Plan> {
    let plan = Plan {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        description: req.description.unwrap_or_default(),
        prices: req.prices,
        api_call_cap: req.api_call_cap,
        data_cap_mb: req.data_cap_mb,
        is_active: true,
        created_at: now,
    };
    plan.validate()?;

    let plan = store.insert_plan(&plan).await?;
    log::info!("Plan '{}' created with id {}", plan.name, plan.id);
    Ok(plan)
}

/// Reads a JSON array of plans, each shaped like [`PlanCreateRequest`].
pub fn read_catalog(path: &str) -> Res<Vec<PlanCreateRequest>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::Internal(format!("Cannot read plan catalog {}: {}", path, e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| AppError::BadRequest(format!("Invalid plan catalog {}: {}", path, e)))
}

/// Creates every catalog plan whose name is not taken yet, retired plans
/// included, so running it on each start is harmless.
///
/// # Returns
///
/// The plans created by this call.
pub async fn seed_plans(
    store: &dyn Store,
    catalog: Vec<PlanCreateRequest>,
    now: DateTime<Utc>,
) -> Res<Vec<Plan>> {
    let mut taken: Vec<String> = store
        .list_plans(false)
        .await?
        .into_iter()
        .map(|p| p.name.to_lowercase())
        .collect();

    let mut created = Vec::new();
    for req in catalog {
        let name = req.name.trim().to_lowercase();
        if taken.contains(&name) {
            log::debug!("Plan '{}' already exists, not seeded", req.name.trim());
            continue;
        }
        created.push(create_plan(store, req, now).await?);
        taken.push(name);
    }
    Ok(created)
}

/// Retires or re-enables a plan. Existing subscriptions keep their snapshot.
pub async fn set_plan_active(store: &dyn Store, plan_id: Uuid, is_active: bool) -> Res<Plan> {
    let plan = store.set_plan_active(plan_id, is_active).await?;
    log::info!("Plan {} is_active set to {}", plan.id, is_active);
    Ok(plan)
}
