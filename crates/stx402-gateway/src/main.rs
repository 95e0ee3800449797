use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402_gateway::{
    config::GatewayConfig, db::Database, metrics::register_metrics, routes, state::AppState,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {e}");
        std::io::Error::other(e)
    })?;
    let port = config.port;
    let allowed_origins = config.allowed_origins.clone();
    let rate_limit_rpm = config.rate_limit_rpm;

    tracing::info!("Starting stx402-gateway on port {}", port);
    tracing::info!("Network: {}", config.network);
    tracing::info!("Public domain: {}", config.public_domain);
    tracing::info!("Facilitator URL: {}", config.facilitator_url);
    tracing::info!(
        "HMAC auth: {}",
        if config.hmac_secret.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );
    tracing::info!(
        "Self-signed payments: {}",
        if config.allow_self_signed {
            "enabled"
        } else {
            "disabled"
        }
    );

    let db = Database::new(&config.db_path).map_err(|e| {
        tracing::error!("Failed to initialize database: {e}");
        std::io::Error::other(e.to_string())
    })?;
    tracing::info!("Database initialized at: {}", config.db_path);

    if let Err(e) = register_metrics() {
        tracing::warn!("Failed to register metrics: {e}");
    }

    let state = AppState::new(config, db).map_err(|e| std::io::Error::other(e.to_string()))?;
    let ledger = state.ledger.clone();
    let state_data = web::Data::new(state);

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm as u64)
        .finish()
        .ok_or_else(|| std::io::Error::other("invalid rate limiter configuration"))?;

    HttpServer::new(move || {
        let cors = x402_gateway::cors::build_cors(&allowed_origins);

        App::new()
            .app_data(state_data.clone())
            .app_data(web::PayloadConfig::new(10 * 1024 * 1024)) // 10MB body limit
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Governor::new(&governor_conf))
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    tracing::info!("Server stopped, flushing call ledger");
    ledger.flush().await;
    Ok(())
}
