use actix_web::body::{BoxBody, MessageBody};
use actix_web::{HttpMessage, web};
use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use colored::Colorize;
use common::env_config::Config;
use common::jwt::get_jwt_claims_or_error;
use common::key::{CredentialScope, get_key_claims_or_error};
use futures::future::{LocalBoxFuture, Ready, ready};
use log::info;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// One line per request: status, method, path, latency and who called.
pub struct LoggerMiddleware {}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for LoggerMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = LoggerMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggerMiddlewareService {
            service: Arc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let method = req.method().to_string();
        let path = req.path().to_string();
        let ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        let console_logging_enabled = req
            .app_data::<web::Data<Arc<Config>>>()
            .map(|config| config.console_logging_enabled)
            .unwrap_or(true);

        // claims are decoded by the extractor middleware, which runs first
        let owner_id = get_jwt_claims_or_error(&req)
            .ok()
            .map(|c| c.user_id)
            .or_else(|| get_key_claims_or_error(&req).ok().map(|c| c.owner_id));
        let started = Instant::now();
        let srv = Arc::clone(&self.service);

        Box::pin(async move {
            let res = srv.call(req).await?;

            if console_logging_enabled {
                let elapsed_ms = started.elapsed().as_millis();
                // only set once the key middleware accepted the credential
                let credential_id: Option<Uuid> =
                    get_scope_from_response(&res).map(|s| s.credential_id);
                let status_code = res.status().as_u16();

                let colored_status = match status_code {
                    200..=299 => status_code.to_string().green(),
                    300..=399 => status_code.to_string().yellow(),
                    400..=499 => status_code.to_string().bright_red(),
                    _ => status_code.to_string().red(),
                };

                let colored_method = match method.as_str() {
                    "GET" => method.blue(),
                    "POST" => method.yellow(),
                    "PUT" => method.purple(),
                    "DELETE" => method.red(),
                    _ => method.normal(),
                };

                info!(
                    "[{}] {} {} {} owner_id={} credential_id={} ip={}",
                    colored_status,
                    colored_method,
                    path.bright_white(),
                    format!("({}ms)", elapsed_ms).bright_black(),
                    owner_id
                        .map_or("None".to_string(), |id| id.to_string())
                        .bright_blue(),
                    credential_id
                        .map_or("None".to_string(), |id| id.to_string())
                        .bright_cyan(),
                    ip,
                );
            }

            Ok(res.map_into_boxed_body())
        })
    }
}

fn get_scope_from_response<B>(res: &ServiceResponse<B>) -> Option<CredentialScope> {
    res.request().extensions().get::<CredentialScope>().cloned()
}

#[cfg(test)]
mod tests {
    use actix_web::{App, HttpResponse, http::StatusCode, test};
    use chrono::Utc;

    use super::*;

    #[actix_web::test]
    async fn responses_pass_through_unchanged() {
        let app = test::init_service(
            App::new()
                .wrap(LoggerMiddleware::new())
                .route("/", web::get().to(|| async { HttpResponse::Created().body("made") })),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(test::read_body(res).await, "made");
    }

    #[actix_web::test]
    async fn credential_scope_is_read_back_from_the_response() {
        let scope = CredentialScope {
            owner_id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
            plan_name: "Basic".to_string(),
            api_calls_limit: 10,
            data_limit_mb: 1,
            expires_at: Utc::now(),
        };
        let app = test::init_service(
            App::new()
                .wrap(LoggerMiddleware::new())
                .route("/", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let req = test::TestRequest::get().uri("/").to_request();
        req.extensions_mut().insert(scope.clone());
        let res = app.call(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(get_scope_from_response(&res), Some(scope));
    }
}
