mod cors;

use actix_web::{
    App, HttpServer,
    web::{self},
};
use common::env_config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();
    let origin = config.cors_allowed_origin.clone();

    // init logger
    if config.console_logging_enabled {
        logger::setup(&config).expect("Failed to set up logger");
    }

    // init store
    let store = db::connect(&config)
        .await
        .expect("Failed to set up database");

    // seed the plan catalog
    if let Some(path) = &config.plans_file {
        let catalog = api_subs::services::plan::read_catalog(path)
            .expect("Failed to read plan catalog");
        let created = api_subs::services::plan::seed_plans(&*store, catalog, chrono::Utc::now())
            .await
            .expect("Failed to seed plan catalog");
        log::info!("Seeded {} plan(s) from {}", created.len(), path);
    }

    // expire overdue subscriptions in the background
    checker::spawn_sweep(store.clone(), config.sweep_interval_secs);

    // rate limiter state is shared by every worker
    let global_limiter = limiter::global_middleware(config.global_rps);
    let credential_limiter = limiter::credential_middleware(config.credential_rps);
    limiter::spawn_housekeeping(credential_limiter.clone(), config.limiter_retain_interval_secs);

    log::info!(
        "Listening on {}:{} ({} environment)",
        config.server_host,
        config.server_port,
        config.environment
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(config_data.clone()))
            .wrap(logger::middleware()) // 4th
            .wrap(extractor::middleware()) // 3rd
            .wrap(global_limiter.clone()) // 2nd
            .wrap(cors::middleware(&origin)) // 1st
            .service(checker::get_health)
            .service(
                web::scope("/api")
                    .service(api_subs::mount_plans())
                    .service(api_subs::mount_webhook())
                    .service(api_keys::mount_internal())
                    .service(
                        web::scope("/dashboard")
                            .wrap(api_auth::auth_middleware())
                            .service(api_subs::mount_subs())
                            .service(api_keys::mount_keys())
                            .service(api_usage::mount_usage())
                            .service(api_usage::mount_summary()),
                    )
                    .service(
                        api_keys::mount_v1()
                            .wrap(limiter::meter_middleware(config_data.enforce_usage_caps)) // 3rd
                            .wrap(credential_limiter.clone()) // 2nd
                            .wrap(api_keys::middleware()), // 1st
                    ),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
