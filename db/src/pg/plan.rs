use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres, types::Json};
use uuid::Uuid;

use crate::models::plan::Plan;

#[derive(Debug, sqlx::FromRow)]
pub struct PlanRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub prices: Json<BTreeMap<String, BigDecimal>>,
    pub api_call_cap: i64,
    pub data_cap_mb: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Plan {
            id: row.id,
            name: row.name,
            description: row.description,
            prices: row.prices.0,
            api_call_cap: row.api_call_cap,
            data_cap_mb: row.data_cap_mb,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

pub async fn get_plan_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    plan_id: Uuid,
) -> Res<Option<Plan>> {
    let row = sqlx::query_as::<_, PlanRow>("SELECT * FROM plans WHERE id = $1")
        .bind(plan_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(Plan::from))
}

pub async fn get_plans<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    active_only: bool,
) -> Res<Vec<Plan>> {
    let rows = sqlx::query_as::<_, PlanRow>(
        "SELECT * FROM plans WHERE ($1 = FALSE OR is_active) ORDER BY name",
    )
    .bind(active_only)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(Plan::from).collect())
}

pub async fn insert_plan<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    plan: &Plan,
) -> Res<Plan> {
    sqlx::query_as::<_, PlanRow>(
        r#"
        INSERT INTO plans (id, name, description, prices, api_call_cap, data_cap_mb, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(plan.id)
    .bind(&plan.name)
    .bind(&plan.description)
    .bind(Json(&plan.prices))
    .bind(plan.api_call_cap)
    .bind(plan.data_cap_mb)
    .bind(plan.is_active)
    .bind(plan.created_at)
    .fetch_one(executor)
    .await
    .map(Plan::from)
    .map_err(AppError::from)
}

pub async fn update_plan_active<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    plan_id: Uuid,
    is_active: bool,
) -> Res<Option<Plan>> {
    let row = sqlx::query_as::<_, PlanRow>(
        "UPDATE plans SET is_active = $1 WHERE id = $2 RETURNING *",
    )
    .bind(is_active)
    .bind(plan_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(Plan::from))
}
