// src/main.rs
use std::env;
use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use coursepay::config::{Catalog, EngineConfig};
use coursepay::notify::LogNotifier;
use coursepay::{api, docs, sweep, AppState};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let catalog_path = env::var("CATALOG_PATH").unwrap_or_else(|_| "catalog.json".to_string());
    let catalog = Catalog::from_file(&catalog_path).expect("Failed to load catalog");

    let config = EngineConfig {
        catalog,
        card_webhook_secret: env::var("CARD_WEBHOOK_SECRET").expect("CARD_WEBHOOK_SECRET required"),
        voucher_webhook_secret: env::var("VOUCHER_WEBHOOK_SECRET")
            .expect("VOUCHER_WEBHOOK_SECRET required"),
        jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET required"),
        reviewer_token: env::var("REVIEWER_TOKEN").expect("REVIEWER_TOKEN required"),
        voucher_validity_hours: env::var("VOUCHER_VALIDITY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(72),
        sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60),
        checkout_base_url: env::var("CHECKOUT_BASE_URL")
            .unwrap_or_else(|_| "https://pay.example.com".to_string()),
    };

    sweep::start_expiry_sweep(pool.clone(), config.sweep_interval_secs);

    let state = web::Data::new(AppState {
        pool,
        config: Arc::new(config),
        notifier: Arc::new(LogNotifier),
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            // Защищённые роуты (студент)
            .service(
                web::scope("/api")
                    .wrap(api::auth::JwtMiddleware)
                    .service(api::manual::submit_manual_request)
                    .service(api::manual::list_manual_requests)
                    .service(api::manual::decide_manual_request)
                    .service(api::checkout::create_checkout)
                    .service(api::checkout::list_attempts)
                    .service(api::checkout::cancel_checkout)
                    .service(api::entitlements::list_entitlements)
                    .service(api::entitlements::check_access)
                    .service(api::entitlements::revoke_entitlement)
                    .service(api::entitlements::list_catalog),
            )
            // Вебхуки (публичные)
            .service(api::webhooks::card_webhook)
            .service(api::webhooks::voucher_webhook)
    })
    .bind(("0.0.0.0", 8065))?
    .run()
    .await
}
