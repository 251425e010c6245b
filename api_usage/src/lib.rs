use actix_web::web;

pub mod routes {
    pub mod usage;
}

pub mod service {
    pub mod dashboard;
    pub mod ledger;
}

pub mod dtos {
    pub mod usage;
}

pub fn mount_usage() -> actix_web::Scope {
    web::scope("/usage").service(routes::usage::get_subscription_usage)
}

pub fn mount_summary() -> actix_web::Scope {
    web::scope("/summary").service(routes::usage::get_summary)
}
