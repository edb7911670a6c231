use std::sync::{Arc, Mutex};

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use hospital_appointments::config::AppConfig;
use hospital_appointments::db;
use hospital_appointments::handlers;
use hospital_appointments::services::notify::webhook::WebhookNotifier;
use hospital_appointments::services::notify::{LogNotifier, NotificationProvider};
use hospital_appointments::services::outbox::run_dispatcher;
use hospital_appointments::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    anyhow::ensure!(!config.jwt_secret.is_empty(), "JWT_SECRET must be set");
    anyhow::ensure!(
        config.day_start_hour < config.day_end_hour && config.day_end_hour <= 24,
        "DAY_START_HOUR must be before DAY_END_HOUR"
    );

    let conn = db::init_db(&config.database_url)?;

    let notifier: Box<dyn NotificationProvider> = if config.notify_webhook_url.is_empty() {
        tracing::info!("no NOTIFY_WEBHOOK_URL set, notifications will be logged");
        Box::new(LogNotifier)
    } else {
        tracing::info!("delivering notifications to {}", config.notify_webhook_url);
        Box::new(WebhookNotifier::new(config.notify_webhook_url.clone()))
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        notifier,
    });

    tokio::spawn(run_dispatcher(state.clone()));

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/appointments/create-appointment",
            post(handlers::appointments::create_appointment),
        )
        .route(
            "/appointments/get-appointment",
            get(handlers::appointments::get_appointments),
        )
        .route(
            "/appointments/availability",
            get(handlers::appointments::get_availability),
        )
        .route(
            "/appointments/:id/reschedule",
            put(handlers::appointments::reschedule_appointment),
        )
        .route(
            "/appointments/:id/cancel",
            put(handlers::appointments::cancel_appointment),
        )
        .route(
            "/appointments/:id/calendar.ics",
            get(handlers::calendar::download_ics),
        )
        .route("/users/:id", put(handlers::users::save_user))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
