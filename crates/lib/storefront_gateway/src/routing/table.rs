use axum::http::Method;
use tracing::debug;

use super::{
    LocalEndpoint, ParamRule, PathParams, PathPattern, PathTemplate, RouteConfigError,
    RouteDescriptor, RouteTarget, Service, TrustLevel, Upstream, UpstreamTarget,
    SUBJECT_PLACEHOLDER,
};
use crate::error::RoutingError;

/// A matched route and the parameters captured from the path.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a RouteDescriptor,
    pub params: PathParams,
}

#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<RouteDescriptor>,
}

enum PendingTarget {
    Local(LocalEndpoint),
    Upstream(Upstream),
}

struct PendingRoute {
    method: Method,
    pattern: String,
    trust: TrustLevel,
    target: PendingTarget,
}

#[derive(Default)]
pub struct RouteTableBuilder {
    pending: Vec<PendingRoute>,
}

impl RouteTableBuilder {
    pub fn local(
        mut self,
        method: Method,
        pattern: &str,
        trust: TrustLevel,
        endpoint: LocalEndpoint,
    ) -> Self {
        self.pending.push(PendingRoute {
            method,
            pattern: pattern.to_string(),
            trust,
            target: PendingTarget::Local(endpoint),
        });
        self
    }

    pub fn proxy(mut self, method: Method, pattern: &str, trust: TrustLevel, upstream: Upstream) -> Self {
        self.pending.push(PendingRoute {
            method,
            pattern: pattern.to_string(),
            trust,
            target: PendingTarget::Upstream(upstream),
        });
        self
    }

    /// Parse and cross-check every route.
    pub fn build(self) -> Result<RouteTable, RouteConfigError> {
        let mut routes: Vec<RouteDescriptor> = Vec::with_capacity(self.pending.len());
        for entry in self.pending {
            let pattern = PathPattern::parse(&entry.pattern)?;
            if routes
                .iter()
                .any(|r| r.method == entry.method && r.pattern.as_str() == pattern.as_str())
            {
                return Err(RouteConfigError::Duplicate {
                    method: entry.method.to_string(),
                    pattern: entry.pattern,
                });
            }

            let target = match entry.target {
                PendingTarget::Local(endpoint) => RouteTarget::Local(endpoint),
                PendingTarget::Upstream(upstream) => {
                    RouteTarget::Upstream(check_upstream(&pattern, entry.trust, upstream)?)
                }
            };

            routes.push(RouteDescriptor {
                method: entry.method,
                pattern,
                trust: entry.trust,
                target,
            });
        }
        Ok(RouteTable { routes })
    }
}

fn check_upstream(
    pattern: &PathPattern,
    trust: TrustLevel,
    upstream: Upstream,
) -> Result<UpstreamTarget, RouteConfigError> {
    let path = PathTemplate::parse(&upstream.path)?;

    for placeholder in path.placeholders() {
        if placeholder != SUBJECT_PLACEHOLDER && !pattern.has_param(placeholder) {
            return Err(RouteConfigError::UnknownPlaceholder {
                pattern: pattern.as_str().to_string(),
                placeholder: placeholder.to_string(),
            });
        }
    }
    for (param, _) in &upstream.rules {
        if !pattern.has_param(param) {
            return Err(RouteConfigError::UnknownRuleParam {
                pattern: pattern.as_str().to_string(),
                param: param.clone(),
            });
        }
    }

    let needs_identity = path.uses_subject()
        || upstream.inject_identity
        || upstream.rules.iter().any(|(_, r)| *r == ParamRule::Owner);
    if needs_identity && !trust.requires_identity() {
        return Err(RouteConfigError::IdentityOnPublicRoute {
            pattern: pattern.as_str().to_string(),
        });
    }

    Ok(UpstreamTarget {
        service: upstream.service,
        path,
        inject_identity: upstream.inject_identity,
        rules: upstream.rules,
    })
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    /// First route, in declaration order, whose method and pattern match.
    pub fn find(&self, method: &Method, path: &str) -> Result<RouteMatch<'_>, RoutingError> {
        let found = self.routes.iter().find_map(|route| {
            if route.method != *method {
                return None;
            }
            route
                .pattern
                .match_path(path)
                .map(|params| RouteMatch { route, params })
        });
        match found {
            Some(m) => Ok(m),
            None => {
                debug!(%method, path, "no route");
                Err(RoutingError::NoMatch)
            }
        }
    }

    /// Routes of the storefront deployment.
    pub fn storefront() -> Result<Self, RouteConfigError> {
        use LocalEndpoint as L;
        use Service::*;
        use TrustLevel::*;

        let cart = |path: &str| Upstream::new(Cart, path).with_identity_header();
        let orders = |path: &str| Upstream::new(Orders, path).with_identity_header();

        Self::builder()
            .local(Method::GET, "/health", Public, L::Health)
            .proxy(Method::POST, "/api/users", Public, Upstream::new(Users, "/api/users"))
            .local(Method::POST, "/api/login", Public, L::Login)
            .local(Method::POST, "/api/refresh", Public, L::Refresh)
            .local(Method::POST, "/api/revoke", Public, L::Revoke)
            .proxy(
                Method::GET,
                "/api/me",
                Authenticated,
                Upstream::new(Users, "/internal/users/{subject}"),
            )
            .proxy(
                Method::GET,
                "/api/users/{userID}",
                Authenticated,
                Upstream::new(Users, "/internal/users/{userID}").with_rule("userID", ParamRule::Owner),
            )
            .proxy(Method::GET, "/api/products", Public, Upstream::new(Products, "/api/products"))
            .proxy(
                Method::GET,
                "/api/products/{productID}",
                Public,
                Upstream::new(Products, "/api/products/{productID}"),
            )
            .proxy(Method::POST, "/admin/products", Admin, Upstream::new(Products, "/api/products"))
            .proxy(
                Method::PATCH,
                "/admin/products/{productID}",
                Admin,
                Upstream::new(Products, "/api/products/{productID}"),
            )
            .proxy(Method::GET, "/api/cart", Authenticated, cart("/api/cart"))
            .proxy(Method::DELETE, "/api/cart", Authenticated, cart("/api/cart"))
            .proxy(Method::POST, "/api/cart/items", Authenticated, cart("/api/cart/items"))
            .proxy(
                Method::PATCH,
                "/api/cart/items/{itemID}",
                Authenticated,
                cart("/api/cart/items/{itemID}").with_rule("itemID", ParamRule::Uuid),
            )
            .proxy(
                Method::DELETE,
                "/api/cart/items/{itemID}",
                Authenticated,
                cart("/api/cart/items/{itemID}").with_rule("itemID", ParamRule::Uuid),
            )
            .proxy(Method::POST, "/api/orders", Authenticated, orders("/api/orders"))
            .proxy(Method::GET, "/api/orders", Authenticated, orders("/api/orders"))
            .proxy(
                Method::GET,
                "/api/orders/{orderID}",
                Authenticated,
                orders("/api/orders/{orderID}").with_rule("orderID", ParamRule::Uuid),
            )
            .proxy(
                Method::DELETE,
                "/api/orders/{orderID}",
                Authenticated,
                orders("/api/orders/{orderID}").with_rule("orderID", ParamRule::Uuid),
            )
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::storefront().unwrap()
    }

    #[test]
    fn storefront_table_is_valid() {
        let t = table();
        assert_eq!(t.routes().len(), 20);
    }

    #[test]
    fn match_requires_method_and_path() {
        let t = table();
        let m = t.find(&Method::GET, "/api/orders/abc").unwrap();
        assert_eq!(m.params.get("orderID"), Some("abc"));
        assert_eq!(m.route.trust, TrustLevel::Authenticated);

        assert_eq!(
            t.find(&Method::PUT, "/api/orders/abc").unwrap_err(),
            RoutingError::NoMatch
        );
        assert_eq!(
            t.find(&Method::GET, "/api/nothing").unwrap_err(),
            RoutingError::NoMatch
        );
    }

    #[test]
    fn session_endpoints_are_local_and_public() {
        let t = table();
        for (method, path, endpoint) in [
            (Method::GET, "/health", LocalEndpoint::Health),
            (Method::POST, "/api/login", LocalEndpoint::Login),
            (Method::POST, "/api/refresh", LocalEndpoint::Refresh),
            (Method::POST, "/api/revoke", LocalEndpoint::Revoke),
        ] {
            let m = t.find(&method, path).unwrap();
            assert_eq!(m.route.trust, TrustLevel::Public);
            assert!(matches!(m.route.target, RouteTarget::Local(e) if e == endpoint));
        }
    }

    #[test]
    fn admin_routes_require_admin() {
        let t = table();
        let m = t.find(&Method::POST, "/admin/products").unwrap();
        assert_eq!(m.route.trust, TrustLevel::Admin);
        let m = t.find(&Method::PATCH, "/admin/products/9").unwrap();
        assert_eq!(m.route.trust, TrustLevel::Admin);
    }

    #[test]
    fn cart_and_order_routes_inject_identity() {
        let t = table();
        for (method, path) in [
            (Method::GET, "/api/cart"),
            (Method::POST, "/api/cart/items"),
            (Method::POST, "/api/orders"),
            (Method::DELETE, "/api/orders/x"),
        ] {
            let m = t.find(&method, path).unwrap();
            let RouteTarget::Upstream(target) = &m.route.target else {
                panic!("{path} should be proxied");
            };
            assert!(target.inject_identity, "{path}");
        }
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let err = RouteTable::builder()
            .local(Method::GET, "/health", TrustLevel::Public, LocalEndpoint::Health)
            .local(Method::GET, "/health", TrustLevel::Public, LocalEndpoint::Health)
            .build()
            .unwrap_err();
        assert!(matches!(err, RouteConfigError::Duplicate { .. }));
    }

    #[test]
    fn same_pattern_with_other_method_is_fine() {
        RouteTable::builder()
            .local(Method::GET, "/health", TrustLevel::Public, LocalEndpoint::Health)
            .local(Method::POST, "/health", TrustLevel::Public, LocalEndpoint::Health)
            .build()
            .unwrap();
    }

    #[test]
    fn placeholder_must_be_captured() {
        let err = RouteTable::builder()
            .proxy(
                Method::GET,
                "/api/orders",
                TrustLevel::Authenticated,
                Upstream::new(Service::Orders, "/api/orders/{orderID}"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, RouteConfigError::UnknownPlaceholder { .. }));
    }

    #[test]
    fn rule_must_name_a_captured_param() {
        let err = RouteTable::builder()
            .proxy(
                Method::GET,
                "/api/orders/{orderID}",
                TrustLevel::Authenticated,
                Upstream::new(Service::Orders, "/api/orders/{orderID}")
                    .with_rule("order", ParamRule::Uuid),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, RouteConfigError::UnknownRuleParam { .. }));
    }

    #[test]
    fn public_routes_cannot_use_identity() {
        for upstream in [
            Upstream::new(Service::Users, "/internal/users/{subject}"),
            Upstream::new(Service::Cart, "/api/cart").with_identity_header(),
            Upstream::new(Service::Users, "/internal/users/{id}").with_rule("id", ParamRule::Owner),
        ] {
            let err = RouteTable::builder()
                .proxy(Method::GET, "/x/{id}", TrustLevel::Public, upstream)
                .build()
                .unwrap_err();
            assert!(matches!(err, RouteConfigError::IdentityOnPublicRoute { .. }));
        }
    }

    #[test]
    fn bad_pattern_fails_the_build() {
        let err = RouteTable::builder()
            .local(Method::GET, "/a//b", TrustLevel::Public, LocalEndpoint::Health)
            .build()
            .unwrap_err();
        assert!(matches!(err, RouteConfigError::InvalidPattern { .. }));
    }
}
