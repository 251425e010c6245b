use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    web,
};
use chrono::Utc;
use common::{error::AppError, key};
use db::store::SharedStore;
use futures::future::{Ready, ok};
use std::{future::Future, pin::Pin, sync::Arc};

use crate::service;

/// Lets a request through only when it carries a valid, active, unexpired
/// API credential. The verified `CredentialScope` is put into the request
/// extensions for the limiter, the metering middleware and handlers.
pub struct KeyMiddleware {}

impl KeyMiddleware {
    pub fn new() -> Self {
        KeyMiddleware {}
    }
}

impl Default for KeyMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for KeyMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = KeyMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(KeyMiddlewareService {
            service: Arc::new(service),
        })
    }
}

pub struct KeyMiddlewareService<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for KeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Arc::clone(&self.service);

        Box::pin(async move {
            let Some(store) = req.app_data::<web::Data<SharedStore>>().cloned() else {
                log::error!("Store is not registered as app data");
                return Ok(req.error_response(AppError::Internal(
                    "Store unavailable".to_string(),
                )));
            };

            // decoded by the extractor middleware
            let key_claims = match key::get_key_claims_or_error(&req) {
                Ok(claims) => claims,
                Err(response) => return Ok(req.into_response(response)),
            };

            match service::key::verify_claims(&***store, &key_claims, Utc::now()).await {
                Ok(scope) => {
                    req.extensions_mut().insert(scope);
                    srv.call(req).await.map(|res| res.map_into_boxed_body())
                }
                Err(e) => {
                    log::warn!(
                        "Rejected credential {} on {}: {}",
                        key_claims.credential_id,
                        req.path(),
                        e
                    );
                    Ok(req.error_response(e))
                }
            }
        })
    }
}
