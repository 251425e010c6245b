use std::{future::Future, pin::Pin, sync::Arc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::HeaderMap,
    web,
};
use futures::future::{Ready, ok};

use common::{
    env_config::Config,
    error::Res,
    jwt::{self, JwtClaims},
    key::KeyClaims,
};

pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Decodes whatever identity the request carries and leaves the result in
/// its extensions. Rejecting is up to the middleware that needs the identity.
pub struct ExtractionMiddleware {}

impl ExtractionMiddleware {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for ExtractionMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for ExtractionMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = ExtractionMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ExtractionMiddlewareService {
            service: Arc::new(service),
        })
    }
}

pub struct ExtractionMiddlewareService<S> {
    service: Arc<S>,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
}

fn api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_owned())
}

impl<S, B> Service<ServiceRequest> for ExtractionMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let auth_header = bearer_token(req.headers());
        let api_key = api_key(req.headers());
        let config = req.app_data::<web::Data<Arc<Config>>>().cloned();
        let srv = Arc::clone(&self.service);

        Box::pin(async move {
            match config {
                Some(config) => {
                    if let Some(token) = auth_header {
                        let claims_res = jwt::validate_jwt(&token, &config.jwt_config.secret);
                        req.extensions_mut().insert::<Res<JwtClaims>>(claims_res);
                    }
                    if let Some(key) = api_key {
                        let claims_res =
                            KeyClaims::from_key(&key, &config.credential_config.secret);
                        req.extensions_mut().insert::<Res<KeyClaims>>(claims_res);
                    }
                }
                None => log::error!("Config is not registered as app data"),
            }
            srv.call(req).await.map(|res| res.map_into_boxed_body())
        })
    }
}
