use middleware::auth::AuthMiddleware;

pub mod middleware {
    pub mod auth;
}

/// Guards owner-scoped routes. Must run inside the extractor middleware.
pub fn auth_middleware() -> AuthMiddleware {
    AuthMiddleware::new()
}
