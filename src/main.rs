use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursepay::adapters::gateway::HttpPaymentGateway;
use coursepay::adapters::postgres::{
    PostgresCatalog, PostgresPromoCodes, PostgresTransactionStore,
};
use coursepay::config::Config;
use coursepay::{create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database pool
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let gateway = HttpPaymentGateway::new(
        config.gateway_base_url.clone(),
        config.gateway_server_key.clone(),
    );
    tracing::info!(
        "Payment gateway client initialized with URL: {}",
        config.gateway_base_url
    );

    let state = AppState::new(
        Arc::new(PostgresTransactionStore::new(pool.clone())),
        Arc::new(PostgresCatalog::new(pool.clone())),
        Arc::new(PostgresPromoCodes::new(pool.clone())),
        Arc::new(gateway),
        config.gateway_webhook_secret.clone(),
        config.admin_token.clone(),
        Some(pool),
    );
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
