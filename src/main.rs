use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod config;
mod db;
mod error;
mod handlers;
mod identity;
mod models;
mod services;

use config::Config;
use services::dedup::InMemoryDedupStore;
use services::notify::WebhookNotifier;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub dedup: InMemoryDedupStore,
    pub notifier: WebhookNotifier,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wishtrail_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Config::from_env();
    let config = Arc::new(config);

    // Database
    let db = db::create_pool(&config.database_url, config.database_max_connections).await;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations applied");

    let dedup = InMemoryDedupStore::new();
    let notifier = WebhookNotifier::new(config.notification_webhook_url.clone());

    let state = AppState {
        db,
        config: config.clone(),
        dedup,
        notifier,
    };

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        // Cron-facing; sits behind the deployment's network boundary
        .route(
            "/internal/reminders/run",
            post(handlers::reminders::run_scan),
        );

    let protected_routes = Router::new()
        // Habits
        .route("/api/habits", get(handlers::habits::list_habits))
        .route("/api/habits", post(handlers::habits::create_habit))
        .route("/api/habits/:id", get(handlers::habits::get_habit))
        .route("/api/habits/:id", put(handlers::habits::update_habit))
        .route("/api/habits/:id", delete(handlers::habits::delete_habit))
        .route(
            "/api/habits/:id/archive",
            post(handlers::habits::archive_habit),
        )
        .route(
            "/api/habits/:id/unarchive",
            post(handlers::habits::unarchive_habit),
        )
        // Logs
        .route("/api/habits/:id/logs", post(handlers::logs::log_event))
        .route("/api/habits/:id/heatmap", get(handlers::logs::get_heatmap))
        // Analytics
        .route(
            "/api/habits/:id/analytics",
            get(handlers::analytics::get_analytics),
        )
        .layer(middleware::from_fn(identity::require_identity));

    let allowed_origins: Vec<axum::http::HeaderValue> = {
        let mut origins = vec![config
            .frontend_url
            .parse::<axum::http::HeaderValue>()
            .unwrap()];
        // In dev, also allow LAN access (e.g. testing from another device)
        if let Ok(extra) = std::env::var("CORS_EXTRA_ORIGINS") {
            for o in extra.split(',') {
                if let Ok(hv) = o.trim().parse::<axum::http::HeaderValue>() {
                    origins.push(hv);
                }
            }
        }
        origins
    };
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static(identity::USER_ID_HEADER),
        ])
        .allow_credentials(true);

    // In-process reminder trigger; 0 hands the cadence to external cron
    if config.reminder_interval_secs > 0 {
        services::scheduler::spawn_reminder_worker(
            state.db.clone(),
            state.dedup.clone(),
            state.notifier.clone(),
            config.reminder_interval_secs,
            config.reminder_window_minutes,
        );
    }

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
