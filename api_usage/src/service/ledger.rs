use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::error::{AppError, Res};
use db::{
    dtos::usage::UsageEntry,
    models::usage::{DailyUsage, UsageRecord},
    store::Store,
};
use uuid::Uuid;

use crate::dtos::usage::{RollupScope, SubscriptionUsageResponse};

/// Longest range a single rollup may cover.
pub const MAX_ROLLUP_DAYS: i64 = 366;

/// Adds one batch of metered activity to the ledger.
///
/// # Arguments
///
/// * `store` - The persistence handle.
/// * `entry` - Deltas for one subscription and day. All counters must be non-negative.
///
/// # Returns
///
/// The accumulated record for that day, or `NotFound` for an unknown subscription.
pub async fn record_usage(store: &dyn Store, entry: UsageEntry) -> Res<UsageRecord> {
    if entry.api_calls < 0
        || entry.requests_successful < 0
        || entry.requests_failed < 0
        || entry.data_mb < BigDecimal::from(0)
    {
        return Err(AppError::BadRequest(
            "Usage deltas must be non-negative".to_string(),
        ));
    }
    if entry.response_time_ms.is_some_and(|ms| !ms.is_finite() || ms < 0.0) {
        return Err(AppError::BadRequest(
            "Response time must be a non-negative number".to_string(),
        ));
    }

    let record = store.record_usage(&entry).await?;
    log::debug!(
        "Recorded {} call(s) for subscription {} on {}",
        entry.api_calls,
        entry.subscription_id,
        entry.date
    );
    Ok(record)
}

/// Produces one entry per day from `start` to `end` inclusive, zero-filled.
///
/// # Arguments
///
/// * `store` - The persistence handle.
/// * `owner_id` - The caller. A subscription scope must belong to them.
/// * `scope` - One subscription, or every subscription of the owner combined.
/// * `start`, `end` - Inclusive calendar range.
/// * `now` - Used to reconcile the subscriptions read.
pub async fn rollup(
    store: &dyn Store,
    owner_id: Uuid,
    scope: RollupScope,
    start: NaiveDate,
    end: NaiveDate,
    now: DateTime<Utc>,
) -> Res<Vec<DailyUsage>> {
    check_range(start, end)?;

    let subscription_ids = match scope {
        RollupScope::Subscription(id) => {
            vec![api_subs::services::sub::get_owned(store, owner_id, id, now).await?.id]
        }
        RollupScope::Owner => api_subs::services::sub::list_owned(store, owner_id, now)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect(),
    };

    let records = if subscription_ids.is_empty() {
        Vec::new()
    } else {
        store.usage_between(&subscription_ids, start, end).await?
    };
    Ok(fill_series(&records, start, end))
}

/// Usage of one subscription over a range, with its cap percentages.
pub async fn subscription_usage(
    store: &dyn Store,
    owner_id: Uuid,
    subscription_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
    now: DateTime<Utc>,
) -> Res<SubscriptionUsageResponse> {
    let subscription =
        api_subs::services::sub::get_owned(store, owner_id, subscription_id, now).await?;
    let series = rollup(
        store,
        owner_id,
        RollupScope::Subscription(subscription_id),
        start,
        end,
        now,
    )
    .await?;

    Ok(SubscriptionUsageResponse {
        subscription_id,
        usage_percentage: subscription.usage_percentage(),
        data_percentage: subscription.data_percentage(),
        api_calls_made: subscription.api_calls_made,
        api_calls_limit: subscription.api_calls_limit,
        data_downloaded_mb: subscription.data_downloaded_mb,
        data_limit_mb: subscription.data_limit_mb,
        start,
        end,
        series,
    })
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Res<()> {
    if start > end {
        return Err(AppError::BadRequest(
            "Range start must not be after its end".to_string(),
        ));
    }
    if (end - start).num_days() >= MAX_ROLLUP_DAYS {
        return Err(AppError::BadRequest(format!(
            "Range may cover at most {} days",
            MAX_ROLLUP_DAYS
        )));
    }
    Ok(())
}

/// Sums records per day and reports missing days as zero usage.
pub fn fill_series(records: &[UsageRecord], start: NaiveDate, end: NaiveDate) -> Vec<DailyUsage> {
    let mut days: BTreeMap<NaiveDate, DailyUsage> = start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| (day, DailyUsage::zero(day)))
        .collect();

    for record in records {
        if let Some(day) = days.get_mut(&record.date) {
            day.add(record);
        }
    }
    days.into_values().collect()
}

/// The default rollup window ending today: `days` calendar days inclusive.
pub fn window(now: DateTime<Utc>, days: u32) -> Res<(NaiveDate, NaiveDate)> {
    if days == 0 || i64::from(days) > MAX_ROLLUP_DAYS {
        return Err(AppError::BadRequest(format!(
            "Window must be between 1 and {} days",
            MAX_ROLLUP_DAYS
        )));
    }
    let end = now.date_naive();
    Ok((end - Duration::days(i64::from(days) - 1), end))
}
