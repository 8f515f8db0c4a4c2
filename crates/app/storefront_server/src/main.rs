//! Storefront gateway server binary.
//!
//! Connects to PostgreSQL, runs migrations, then serves the gateway until
//! Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use storefront_core::auth::password::BcryptHasher;
use storefront_core::auth::queries::{PgRefreshTokenStore, PgUserDirectory};
use storefront_core::clock::SystemClock;
use storefront_gateway::AppState;
use storefront_gateway::config::GatewayConfig;
use tracing::{info, warn};

/// CLI arguments for the gateway.
#[derive(Parser, Debug)]
#[command(name = "storefront_server", about = "Storefront edge gateway")]
struct Args {
    /// Port to listen on. Overrides the port of `BIND_ADDR`.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/storefront"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,storefront_gateway=debug,storefront_core=debug",
                )
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = GatewayConfig::from_env();
    config.database_url = args.database_url;
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".into());
        config.bind_addr = format!("{host}:{port}");
    }
    info!(?config, "starting storefront_server");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    info!("running database migrations");
    storefront_gateway::migrate(&pool).await?;

    let clock = Arc::new(SystemClock);
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(
        config,
        clock.clone(),
        Arc::new(PgRefreshTokenStore::new(pool.clone(), clock)),
        Arc::new(PgUserDirectory::new(pool)),
        Arc::new(BcryptHasher::default()),
    )?;

    let app = storefront_gateway::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
