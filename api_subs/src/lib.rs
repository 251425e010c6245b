use actix_web::web::{self};

pub mod routes {
    pub mod pay;
    pub mod plans;
    pub mod sub;
}

pub mod services {
    pub mod pay;
    pub mod plan;
    pub mod sub;
}

pub mod dtos {
    pub mod pay;
    pub mod plan;
    pub mod sub;
}

pub fn mount_plans() -> actix_web::Scope {
    web::scope("/plans")
        .service(routes::plans::get_plans)
        .service(routes::plans::get_plan)
}

pub fn mount_subs() -> actix_web::Scope {
    web::scope("/sub")
        .service(routes::sub::get_subscriptions)
        .service(routes::sub::get_subscription)
        .service(routes::sub::post_pause)
        .service(routes::sub::post_resume)
        .service(routes::sub::post_cancel)
}

pub fn mount_webhook() -> actix_web::Scope {
    web::scope("/pay").service(routes::pay::post_webhook)
}
