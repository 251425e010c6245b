use std::{future::Future, pin::Pin, sync::Arc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::jwt;
use futures::future::{Ready, ok};

/// Requires a valid session token. The decoded `JwtClaims` are re-inserted
/// as a plain extension so handlers can take `web::ReqData<JwtClaims>`.
pub struct AuthMiddleware {}

impl AuthMiddleware {
    pub fn new() -> Self {
        AuthMiddleware {}
    }
}

impl Default for AuthMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Arc::clone(&self.service);

        Box::pin(async move {
            // decoded by the extractor middleware
            match jwt::get_jwt_claims_or_error(&req) {
                Ok(claims) => {
                    req.extensions_mut().insert(claims);
                    srv.call(req).await.map(|res| res.map_into_boxed_body())
                }
                Err(response) => {
                    log::debug!("Unauthenticated request to {}", req.path());
                    Ok(req.into_response(response))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{
        App, HttpResponse,
        http::StatusCode,
        test::{self, TestRequest},
        web,
    };
    use common::{error::Res, jwt::JwtClaims};
    use uuid::Uuid;

    use super::*;

    async fn whoami(claims: web::ReqData<JwtClaims>) -> HttpResponse {
        HttpResponse::Ok().body(claims.user_id.to_string())
    }

    #[actix_web::test]
    async fn missing_session_is_unauthorized() {
        let app = test::init_service(
            App::new().service(
                web::scope("/dash")
                    .wrap(AuthMiddleware::new())
                    .route("/me", web::get().to(whoami)),
            ),
        )
        .await;

        let resp = test::call_service(&app, TestRequest::get().uri("/dash/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn decoded_session_reaches_handler() {
        let user_id = Uuid::new_v4();

        let app = test::init_service(
            App::new().service(
                web::scope("/dash")
                    .wrap(AuthMiddleware::new())
                    .route("/me", web::get().to(whoami)),
            ),
        )
        .await;

        let req = TestRequest::get().uri("/dash/me").to_request();
        req.extensions_mut()
            .insert::<Res<JwtClaims>>(Ok(JwtClaims { user_id, exp: usize::MAX }));
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, user_id.to_string());
    }
}
