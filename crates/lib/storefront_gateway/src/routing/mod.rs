//! Declarative route table.
//!
//! Each route pairs a method and path pattern with a trust level and a
//! target: a local endpoint served by the gateway, or an upstream service
//! and path template. The table is validated when built, so a bad entry
//! fails at start and never at request time.

pub mod pattern;
mod table;

use std::fmt;

use storefront_core::models::auth::Role;
use thiserror::Error;

pub use pattern::{PathParams, PathPattern, PathTemplate, SUBJECT_PLACEHOLDER};
pub use table::{RouteMatch, RouteTable, RouteTableBuilder};

/// Backend services the gateway forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Users,
    Products,
    Cart,
    Orders,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Users => "users",
            Service::Products => "products",
            Service::Cart => "cart",
            Service::Orders => "orders",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum identity a request needs before it is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    /// No credential checked.
    Public,
    /// Any valid access token.
    Authenticated,
    /// Valid access token carrying the admin role.
    Admin,
}

impl TrustLevel {
    /// Whether a verified identity with `role` satisfies this level.
    pub fn permits(&self, role: Role) -> bool {
        match self {
            TrustLevel::Public | TrustLevel::Authenticated => true,
            TrustLevel::Admin => role == Role::Admin,
        }
    }

    pub fn requires_identity(&self) -> bool {
        !matches!(self, TrustLevel::Public)
    }
}

/// Extra check applied to a captured path parameter before forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRule {
    /// Forwarded as captured.
    Verbatim,
    /// Must parse as a UUID, otherwise 400.
    Uuid,
    /// Must equal the session user id, otherwise 403.
    Owner,
}

/// Endpoints the gateway serves itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalEndpoint {
    Health,
    Login,
    Refresh,
    Revoke,
}

/// Upstream half of a route.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    pub service: Service,
    pub path: PathTemplate,
    /// Overwrite `X-User-ID` with the session user id.
    pub inject_identity: bool,
    pub rules: Vec<(String, ParamRule)>,
}

impl UpstreamTarget {
    pub fn rule(&self, param: &str) -> ParamRule {
        self.rules
            .iter()
            .find(|(name, _)| name == param)
            .map(|(_, rule)| *rule)
            .unwrap_or(ParamRule::Verbatim)
    }
}

#[derive(Debug, Clone)]
pub enum RouteTarget {
    Local(LocalEndpoint),
    Upstream(UpstreamTarget),
}

/// One validated route.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    pub method: axum::http::Method,
    pub pattern: PathPattern,
    pub trust: TrustLevel,
    pub target: RouteTarget,
}

/// Unvalidated upstream target, as written in a table definition.
#[derive(Debug, Clone)]
pub struct Upstream {
    service: Service,
    path: String,
    inject_identity: bool,
    rules: Vec<(String, ParamRule)>,
}

impl Upstream {
    pub fn new(service: Service, path: &str) -> Self {
        Self {
            service,
            path: path.to_string(),
            inject_identity: false,
            rules: Vec::new(),
        }
    }

    /// Send the session user id to the service as `X-User-ID`.
    pub fn with_identity_header(mut self) -> Self {
        self.inject_identity = true;
        self
    }

    pub fn with_rule(mut self, param: &str, rule: ParamRule) -> Self {
        self.rules.push((param.to_string(), rule));
        self
    }
}

/// Route table definition errors. All are fatal at start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteConfigError {
    #[error("bad path pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("bad path template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("route `{pattern}` uses `{{{placeholder}}}`, which its pattern does not capture")]
    UnknownPlaceholder { pattern: String, placeholder: String },

    #[error("route `{pattern}` has a rule for `{param}`, which its pattern does not capture")]
    UnknownRuleParam { pattern: String, param: String },

    #[error("public route `{pattern}` needs a session identity")]
    IdentityOnPublicRoute { pattern: String },

    #[error("duplicate route {method} {pattern}")]
    Duplicate { method: String, pattern: String },
}
