//! Gateway configuration.
//!
//! Built once at start and handed to every component through `AppState`;
//! nothing reads the environment after that.

use std::fmt;
use std::time::Duration;

use storefront_core::auth::jwt::{DEFAULT_ISSUER, resolve_jwt_secret};
use url::Url;

use crate::routing::Service;

/// Access token lifetime when `ACCESS_TOKEN_TTL_SECS` is unset: 1 hour.
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Refresh token lifetime when `REFRESH_TOKEN_TTL_DAYS` is unset: 60 days.
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(60 * 24 * 60 * 60);

/// Outbound request timeout when `UPSTREAM_TIMEOUT_SECS` is unset.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URLs of the backend services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamUrls {
    pub users: String,
    pub products: String,
    pub cart: String,
    pub orders: String,
}

impl UpstreamUrls {
    pub fn get(&self, service: Service) -> &str {
        match service {
            Service::Users => &self.users,
            Service::Products => &self.products,
            Service::Cart => &self.cart,
            Service::Orders => &self.orders,
        }
    }
}

/// Configuration for the gateway.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Address to bind the HTTP listener (e.g. "0.0.0.0:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Access token signing secret.
    pub jwt_secret: String,
    /// `iss` claim written to and required on access tokens.
    pub jwt_issuer: String,
    /// Deployment platform; `dev` relaxes the `Secure` cookie attribute.
    pub platform: String,
    pub upstreams: UpstreamUrls,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub upstream_timeout: Duration,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &redacted_url(&self.database_url))
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("platform", &self.platform)
            .field("upstreams", &self.upstreams)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}

impl GatewayConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                 | Default                                   |
    /// |--------------------------|-------------------------------------------|
    /// | `BIND_ADDR`              | `0.0.0.0:8080`                            |
    /// | `DATABASE_URL`           | `postgres://localhost:5432/storefront`    |
    /// | `SECRET_KEY` / `JWT_SECRET` | generated & persisted to file          |
    /// | `JWT_ISSUER`             | `storefront`                              |
    /// | `PLATFORM`               | `production`                              |
    /// | `USER_SERVICE_URL`       | `http://localhost:8081`                   |
    /// | `PRODUCT_SERVICE_URL`    | `http://localhost:8082`                   |
    /// | `CART_SERVICE_URL`       | `http://localhost:8083`                   |
    /// | `ORDER_SERVICE_URL`      | `http://localhost:8084`                   |
    /// | `ACCESS_TOKEN_TTL_SECS`  | `3600`                                    |
    /// | `REFRESH_TOKEN_TTL_DAYS` | `60`                                      |
    /// | `UPSTREAM_TIMEOUT_SECS`  | `30`                                      |
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            database_url: env_or("DATABASE_URL", "postgres://localhost:5432/storefront"),
            jwt_secret: resolve_jwt_secret(),
            jwt_issuer: env_or("JWT_ISSUER", DEFAULT_ISSUER),
            platform: env_or("PLATFORM", "production"),
            upstreams: UpstreamUrls {
                users: env_or("USER_SERVICE_URL", "http://localhost:8081"),
                products: env_or("PRODUCT_SERVICE_URL", "http://localhost:8082"),
                cart: env_or("CART_SERVICE_URL", "http://localhost:8083"),
                orders: env_or("ORDER_SERVICE_URL", "http://localhost:8084"),
            },
            access_token_ttl: env_secs("ACCESS_TOKEN_TTL_SECS", 1)
                .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL),
            refresh_token_ttl: env_secs("REFRESH_TOKEN_TTL_DAYS", 24 * 60 * 60)
                .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL),
            upstream_timeout: env_secs("UPSTREAM_TIMEOUT_SECS", 1)
                .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT),
        }
    }

    /// Whether the gateway runs in the development platform.
    pub fn is_dev(&self) -> bool {
        self.platform == "dev"
    }
}

/// Connection URL with any password masked. Text that does not parse as a
/// URL is hidden whole.
fn redacted_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("<redacted>")).is_err() {
                return "<redacted>".to_string();
            }
            url.to_string()
        }
        Err(_) if raw.is_empty() => String::new(),
        Err(_) => "<redacted>".to_string(),
    }
}

/// Read a non-empty environment variable or fall back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Read a positive integer variable, scaled by `unit_secs`.
fn env_secs(key: &str, unit_secs: u64) -> Option<Duration> {
    parse_units(&std::env::var(key).ok()?, unit_secs)
}

fn parse_units(raw: &str, unit_secs: u64) -> Option<Duration> {
    let n = raw.trim().parse::<u64>().ok().filter(|n| *n > 0)?;
    n.checked_mul(unit_secs).map(Duration::from_secs)
}
