use actix_web::{
    Error,
    body::{BodySize, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    web,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use common::{
    error::{AppError, Res},
    key::{self, CredentialScope},
};
use db::{dtos::usage::UsageEntry, store::SharedStore};
use std::{future::Future, pin::Pin, rc::Rc, time::Instant};

const BYTES_PER_MB: i64 = 1_048_576;
/// Matches the scale of the `data_downloaded_mb` columns.
const MB_SCALE: i64 = 6;

/// Writes one ledger entry per credential-authenticated request: a call,
/// its outcome, its latency and the response size. With `enforce_caps` set,
/// subscriptions already at their call or data cap are refused up front.
pub struct UsageMeter {
    enforce_caps: bool,
}

impl UsageMeter {
    pub fn new(enforce_caps: bool) -> Self {
        Self { enforce_caps }
    }
}

impl<S, B> Transform<S, ServiceRequest> for UsageMeter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = UsageMeterService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(UsageMeterService {
            service: Rc::new(service),
            enforce_caps: self.enforce_caps,
        }))
    }
}

pub struct UsageMeterService<S> {
    service: Rc<S>,
    enforce_caps: bool,
}

impl<S, B> Service<ServiceRequest> for UsageMeterService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Rc::clone(&self.service);
        let enforce_caps = self.enforce_caps;

        Box::pin(async move {
            let (Some(scope), Some(store)) = (
                key::get_scope(&req),
                req.app_data::<web::Data<SharedStore>>().cloned(),
            ) else {
                log::warn!("Request to {} is not metered", req.path());
                return srv.call(req).await.map(|res| res.map_into_boxed_body());
            };

            if enforce_caps {
                if let Err(e) = check_caps(&***store, &scope).await {
                    return Ok(req.error_response(e));
                }
            }

            let started = Instant::now();
            let res = srv.call(req).await?;
            let entry = entry_for(
                &scope,
                res.status().as_u16() < 400,
                started.elapsed().as_secs_f64() * 1000.0,
                res.response().body().size(),
            );

            if let Err(e) = api_usage::service::ledger::record_usage(&***store, entry).await {
                log::error!(
                    "Failed to meter request for subscription {}: {}",
                    scope.subscription_id,
                    e
                );
            }
            Ok(res.map_into_boxed_body())
        })
    }
}

async fn check_caps(store: &dyn db::store::Store, scope: &CredentialScope) -> Res<()> {
    let subscription = store
        .get_subscription(scope.subscription_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

    if subscription.api_calls_made >= subscription.api_calls_limit {
        return Err(AppError::TooManyRequests(format!(
            "API call cap of {} reached",
            subscription.api_calls_limit
        )));
    }
    if subscription.data_downloaded_mb >= BigDecimal::from(subscription.data_limit_mb) {
        return Err(AppError::TooManyRequests(format!(
            "Data cap of {} MB reached",
            subscription.data_limit_mb
        )));
    }
    Ok(())
}

fn entry_for(
    scope: &CredentialScope,
    succeeded: bool,
    elapsed_ms: f64,
    body: BodySize,
) -> UsageEntry {
    let bytes = match body {
        BodySize::Sized(n) => n as i64,
        BodySize::None | BodySize::Stream => 0,
    };

    UsageEntry {
        subscription_id: scope.subscription_id,
        date: Utc::now().date_naive(),
        api_calls: 1,
        data_mb: (BigDecimal::from(bytes) / BigDecimal::from(BYTES_PER_MB)).round(MB_SCALE),
        requests_successful: i64::from(succeeded),
        requests_failed: i64::from(!succeeded),
        response_time_ms: Some(elapsed_ms),
    }
}
