use actix_web::web;
use middleware::key::KeyMiddleware;

pub mod routes {
    pub mod key;
    pub mod verify;
}
pub mod middleware {
    pub mod key;
}

pub mod service {
    pub mod key;
}
pub mod dtos {
    pub mod key;
}

pub fn mount_keys() -> actix_web::Scope {
    web::scope("/key")
        .service(routes::key::get_keys)
        .service(routes::key::post_generate_key)
        .service(routes::key::post_revoke)
        .service(routes::key::post_refresh)
}

pub fn mount_internal() -> actix_web::Scope {
    web::scope("/internal").service(routes::verify::post_verify)
}

/// Endpoints served to credential holders. Wrap with [`middleware`].
pub fn mount_v1() -> actix_web::Scope {
    web::scope("/v1").service(routes::verify::get_scope)
}

pub fn middleware() -> KeyMiddleware {
    KeyMiddleware::new()
}
