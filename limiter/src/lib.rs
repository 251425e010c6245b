use std::time::Duration;

use middleware::{credential::CredentialRateLimiter, global::GlobalLimiter, meter::UsageMeter};
use tokio::task::JoinHandle;

pub mod middleware {
    pub mod credential;
    pub mod global;
    pub mod meter;
}

pub fn global_middleware(permits_per_second: u32) -> GlobalLimiter {
    GlobalLimiter::new(permits_per_second)
}

pub fn credential_middleware(permits_per_second: u32) -> CredentialRateLimiter {
    CredentialRateLimiter::new(permits_per_second)
}

pub fn meter_middleware(enforce_caps: bool) -> UsageMeter {
    UsageMeter::new(enforce_caps)
}

/// Forgets idle credential buckets every `interval_secs` so the table only
/// holds recently used credentials. An interval of 0 disables it.
pub fn spawn_housekeeping(
    limiter: CredentialRateLimiter,
    interval_secs: u64,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        log::warn!("Credential limiter housekeeping disabled");
        return None;
    }

    log::info!("Start credential limiter housekeeping every {}s", interval_secs);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let dropped = limiter.forget_idle();
            if dropped > 0 {
                log::debug!(
                    "Dropped {} idle credential bucket(s), {} left",
                    dropped,
                    limiter.tracked_credentials()
                );
            }
        }
    }))
}
