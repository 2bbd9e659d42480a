use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use decision_engine::config::Config;
use decision_engine::db;
use decision_engine::handlers;
use decision_engine::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("decision-engine.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();

        run_server(config).await
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        run_server(config).await
    }
}

async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("decision engine starting up");
    tracing::info!("configuration loaded successfully");

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("database pool created successfully");

    let state = Arc::new(AppState::new(pool, &config));

    let job_routes = Router::new()
        .route("/api/jobs", post(handlers::submit_job))
        .route("/api/jobs/:id", get(handlers::get_job))
        .route("/api/jobs/:id/cancel", post(handlers::cancel_job));

    let health_routes = Router::new().route("/health", get(health_check));

    let app = Router::new()
        .merge(job_routes)
        .merge(health_routes)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
