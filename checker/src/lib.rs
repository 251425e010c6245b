use std::time::Duration;

use actix_web::{Responder, get};
use api_subs::dtos::sub::SweepReport;
use chrono::{DateTime, Utc};
use common::{error::Res, http::Success};
use db::store::{SharedStore, Store};
use serde::Serialize;
use tokio::task::JoinHandle;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe. Does not touch the store.
#[get("/health")]
pub async fn get_health() -> Res<impl Responder> {
    Success::ok(HealthResponse { status: "ok" })
}

/// One sweep pass. Failures are logged and reported as an empty pass so the
/// loop keeps running.
pub async fn sweep_once(store: &dyn Store, now: DateTime<Utc>) -> SweepReport {
    match api_subs::services::sub::sweep_expired(store, now).await {
        Ok(report) => {
            if report != SweepReport::default() {
                log::info!(
                    "Sweep expired {} subscription(s), deactivated {} credential(s)",
                    report.subscriptions_expired,
                    report.credentials_deactivated
                );
            }
            report
        }
        Err(e) => {
            log::error!("Expiry sweep failed: {}", e);
            SweepReport::default()
        }
    }
}

/// Runs [`sweep_once`] every `interval_secs`. An interval of 0 disables the
/// sweep; expiry then happens only when subscriptions are read.
pub fn spawn_sweep(store: SharedStore, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        log::warn!("Expiry sweep disabled");
        return None;
    }

    log::info!("Start expiry sweep every {}s", interval_secs);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            sweep_once(&*store, Utc::now()).await;
        }
    }))
}
