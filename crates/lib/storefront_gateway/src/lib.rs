//! # storefront_gateway
//!
//! Edge gateway for the storefront: authenticates requests, applies the
//! per-route trust policy and forwards to the user, product, cart and order
//! services. Login, refresh and revoke are served locally.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod routing;
pub mod services;

use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use storefront_core::auth::jwt::TokenService;
use storefront_core::auth::password::PasswordHasher;
use storefront_core::auth::refresh::RefreshTokenStore;
use storefront_core::auth::users::UserDirectory;
use storefront_core::clock::Clock;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::InitError;
use crate::proxy::ProxyDispatcher;
use crate::routing::RouteTable;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub tokens: Arc<TokenService>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub users: Arc<dyn UserDirectory>,
    pub passwords: Arc<dyn PasswordHasher>,
    pub routes: Arc<RouteTable>,
    pub proxy: ProxyDispatcher,
}

impl AppState {
    /// Wire the gateway with the storefront route table.
    pub fn new(
        config: GatewayConfig,
        clock: Arc<dyn Clock>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        users: Arc<dyn UserDirectory>,
        passwords: Arc<dyn PasswordHasher>,
    ) -> Result<Self, InitError> {
        let routes = RouteTable::storefront()?;
        let proxy = ProxyDispatcher::new(&config.upstreams, config.upstream_timeout)?;
        let tokens = TokenService::new(
            config.jwt_secret.as_bytes(),
            config.jwt_issuer.clone(),
            clock,
        );
        info!(routes = routes.routes().len(), "gateway state ready");

        Ok(Self {
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            refresh_tokens,
            users,
            passwords,
            routes: Arc::new(routes),
            proxy,
        })
    }
}

/// Run embedded database migrations.
///
/// Delegates to `storefront_core::migrate::migrate()` which owns the
/// migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    storefront_core::migrate::migrate(pool).await
}

/// Builds the Axum router. Every request goes through the route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .fallback(handlers::gateway::dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
