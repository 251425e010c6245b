use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use common::error::Res;
use db::{
    models::subscription::{Subscription, SubscriptionStatus},
    store::Store,
};
use uuid::Uuid;

use crate::dtos::usage::{DashboardSummary, StatusCounts};

use super::ledger;

/// Builds the owner's dashboard: status counts, lifetime spend, lifetime
/// usage and a daily series for the last `window_days` days.
///
/// # Arguments
///
/// * `store` - The persistence handle.
/// * `owner_id` - The authenticated owner.
/// * `window_days` - Length of the series, ending today. Must be at least 1.
/// * `now` - Every subscription is reconciled against this instant first.
pub async fn summary(
    store: &dyn Store,
    owner_id: Uuid,
    window_days: u32,
    now: DateTime<Utc>,
) -> Res<DashboardSummary> {
    let (start, end) = ledger::window(now, window_days)?;
    let subscriptions = api_subs::services::sub::list_owned(store, owner_id, now).await?;

    let ids: Vec<Uuid> = subscriptions.iter().map(|s| s.id).collect();
    let records = if ids.is_empty() {
        Vec::new()
    } else {
        store.usage_between(&ids, start, end).await?
    };

    Ok(DashboardSummary {
        total_subscriptions: subscriptions.len() as u32,
        counts: count_statuses(&subscriptions),
        lifetime_spend: lifetime_spend(&subscriptions),
        total_api_calls: subscriptions.iter().map(|s| s.api_calls_made).sum(),
        total_data_mb: subscriptions.iter().map(|s| &s.data_downloaded_mb).sum(),
        window_days,
        series: ledger::fill_series(&records, start, end),
    })
}

pub fn count_statuses(subscriptions: &[Subscription]) -> StatusCounts {
    subscriptions
        .iter()
        .fold(StatusCounts::default(), |mut counts, s| {
            match s.status {
                SubscriptionStatus::Active => counts.active += 1,
                SubscriptionStatus::Paused => counts.paused += 1,
                SubscriptionStatus::Expired => counts.expired += 1,
                SubscriptionStatus::Cancelled => counts.cancelled += 1,
            }
            counts
        })
}

/// Sum of what the owner paid, terminal subscriptions included.
pub fn lifetime_spend(subscriptions: &[Subscription]) -> BigDecimal {
    subscriptions.iter().map(|s| &s.total_cost).sum()
}
