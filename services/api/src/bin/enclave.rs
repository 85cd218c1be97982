//! services/api/src/bin/enclave.rs

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use enclave_api::{
    adapters::{spawn_sweeper, DbAdapter, InMemoryRateLimiter, TracingNotifier},
    config::{Config, ConfigError},
    error::ApiError,
    web::{router, state::AppState},
};
use enclave_core::{
    seed::seed_demo_data, AlertNotifier, DatabaseService, InMemoryStore, PasswordService,
    RateLimitStore,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!(environment = ?config.environment, "Configuration loaded. Starting server...");
    if config.uses_development_secrets() {
        warn!("JWT_SECRET or JWT_REFRESH_SECRET not set; using development secrets");
    }

    // --- 2. Choose the Store ---
    let db: Arc<dyn DatabaseService> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await?;
            let adapter = DbAdapter::new(pool);
            info!("Running database migrations...");
            adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(adapter)
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store. Data is lost on restart.");
            Arc::new(InMemoryStore::new())
        }
    };

    let passwords = Arc::new(
        PasswordService::new().map_err(|e| ApiError::Internal(e.to_string()))?,
    );
    if config.seed_demo_data {
        seed_demo_data(db.clone(), &passwords)
            .await
            .map_err(|e| ApiError::Internal(format!("Seeding demo data failed: {e}")))?;
    }

    // --- 3. Build the Shared AppState ---
    let notifier: Arc<dyn AlertNotifier> = Arc::new(TracingNotifier);
    let rate_limiter: Arc<dyn RateLimitStore> = Arc::new(InMemoryRateLimiter::new());
    let app_state = Arc::new(AppState::build(
        config.clone(),
        db,
        passwords,
        notifier,
        rate_limiter.clone(),
    ));

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(rate_limiter, SWEEP_INTERVAL, shutdown.clone());

    // --- 4. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);
    let app = router(app_state).layer(cors);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!("Swagger UI available at http://{}/swagger-ui", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!("Rate-limit sweeper panicked: {:?}", e);
    }
    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {}", e);
    }
    info!("Shutdown signal received.");
    shutdown.cancel();
}
