use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::{error::AppError, key};
use governor::{Quota, RateLimiter, clock::QuantaClock, state::keyed::DashMapStateStore};
use std::{future::Future, num::NonZeroU32, pin::Pin, rc::Rc, sync::Arc};
use uuid::Uuid;

type CredentialStateStore = DashMapStateStore<Uuid>;
type KeyedLimiter = RateLimiter<Uuid, CredentialStateStore, QuantaClock>;

/// Per-credential request rate. Runs after the key middleware, which leaves
/// the verified `CredentialScope` in the request extensions.
///
/// Clones share one bucket table, so build it once and hand a clone to each
/// worker.
#[derive(Clone)]
pub struct CredentialRateLimiter {
    limiter: Arc<KeyedLimiter>,
}

impl CredentialRateLimiter {
    pub fn new(permits_per_sec: u32) -> Self {
        let permits = NonZeroU32::new(permits_per_sec).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_second(permits))),
        }
    }

    /// Takes one permit from the credential's bucket.
    pub fn allows(&self, credential_id: &Uuid) -> bool {
        self.limiter.check_key(credential_id).is_ok()
    }

    /// Number of credentials with a bucket in memory.
    pub fn tracked_credentials(&self) -> usize {
        self.limiter.len()
    }

    /// Drops the buckets of credentials that are back to a full allowance.
    /// Returns how many were dropped.
    pub fn forget_idle(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        before.saturating_sub(self.limiter.len())
    }
}

impl<S, B> Transform<S, ServiceRequest> for CredentialRateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = CredentialRateLimiterService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(CredentialRateLimiterService {
            service: Rc::new(service),
            limiter: self.clone(),
        }))
    }
}

pub struct CredentialRateLimiterService<S> {
    service: Rc<S>,
    limiter: CredentialRateLimiter,
}

impl<S, B> Service<ServiceRequest> for CredentialRateLimiterService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Rc::clone(&self.service);
        let limiter = self.limiter.clone();

        Box::pin(async move {
            if let Some(scope) = key::get_scope(&req) {
                if !limiter.allows(&scope.credential_id) {
                    log::debug!("Credential {} is over its rate", scope.credential_id);
                    return Ok(req.error_response(AppError::TooManyRequests(
                        "Rate limit exceeded for this credential".to_string(),
                    )));
                }
            } else {
                log::warn!("Credential limiter mounted without key verification on {}", req.path());
            }

            srv.call(req).await.map(|res| res.map_into_boxed_body())
        })
    }
}
