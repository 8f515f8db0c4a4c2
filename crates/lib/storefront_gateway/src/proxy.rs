//! Forwarding of matched requests to backend services.
//!
//! Request and response bodies are streamed in both directions. Dropping the
//! future returned by [`ProxyDispatcher::forward`] drops the outbound request
//! with it, so an abandoned client cancels its upstream call.

use std::time::Duration;

use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use storefront_core::models::auth::SessionIdentity;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::UpstreamUrls;
use crate::error::{AppResult, AuthorizationError, GatewayError, InitError, RoutingError, UpstreamError};
use crate::routing::{ParamRule, PathParams, UpstreamTarget};

/// Trust header carrying the session user id to backend services.
pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

/// Connection-scoped headers never relayed in either direction.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Shared outbound client plus the base URL of every service.
#[derive(Clone, Debug)]
pub struct ProxyDispatcher {
    client: reqwest::Client,
    upstreams: UpstreamUrls,
}

impl ProxyDispatcher {
    /// Validate the base URLs and build the pooled client.
    pub fn new(upstreams: &UpstreamUrls, timeout: Duration) -> Result<Self, InitError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            upstreams: UpstreamUrls {
                users: base_url(&upstreams.users)?,
                products: base_url(&upstreams.products)?,
                cart: base_url(&upstreams.cart)?,
                orders: base_url(&upstreams.orders)?,
            },
        })
    }

    /// Send `request` to the route's service and relay the answer.
    ///
    /// Path parameter rules run first; a rejected parameter never reaches
    /// the network.
    pub async fn forward(
        &self,
        target: &UpstreamTarget,
        params: &PathParams,
        identity: Option<SessionIdentity>,
        request: Request,
    ) -> AppResult<Response> {
        check_path_params(target, params, identity.as_ref())?;

        let path = target
            .path
            .render(params, identity.map(|i| i.user_id))
            .ok_or_else(|| {
                GatewayError::Internal(format!("unresolved placeholder in {}", target.path.as_str()))
            })?;
        let (parts, body) = request.into_parts();
        let url = upstream_url(self.upstreams.get(target.service), &path, parts.uri.query());

        let mut headers = forwarded_headers(&parts.headers);
        if target.inject_identity
            && let Some(identity) = identity
        {
            let value = HeaderValue::from_str(&identity.user_id.to_string())
                .map_err(|e| GatewayError::Internal(e.to_string()))?;
            headers.insert(USER_ID_HEADER, value);
        }

        debug!(service = %target.service, method = %parts.method, %url, "forwarding");
        let mut outbound = self.client.request(parts.method, &url).headers(headers);
        if body.size_hint().exact() != Some(0) {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = outbound.send().await.map_err(|e| {
            warn!(service = %target.service, %url, timeout = e.is_timeout(), error = %e, "upstream request failed");
            UpstreamError::Unreachable(e.to_string())
        })?;

        let status = upstream.status();
        debug!(service = %target.service, status = status.as_u16(), "upstream responded");

        let mut response = Response::builder().status(status);
        if let Some(out) = response.headers_mut() {
            *out = relayed_headers(upstream.headers());
        }
        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| UpstreamError::BadStatus(e.to_string()).into())
    }
}

fn base_url(raw: &str) -> Result<String, InitError> {
    let invalid = |reason: &str| InitError::UpstreamUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid("base URL cannot carry a query or fragment"));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn upstream_url(base: &str, path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) => format!("{base}{path}?{q}"),
        None => format!("{base}{path}"),
    }
}

/// Apply the route's parameter rules.
pub fn check_path_params(
    target: &UpstreamTarget,
    params: &PathParams,
    identity: Option<&SessionIdentity>,
) -> Result<(), GatewayError> {
    for (name, value) in params.iter() {
        match target.rule(name) {
            ParamRule::Verbatim => {}
            ParamRule::Uuid => {
                Uuid::parse_str(value).map_err(|_| RoutingError::InvalidPathParam(name.to_string()))?;
            }
            ParamRule::Owner => {
                let id = Uuid::parse_str(value)
                    .map_err(|_| RoutingError::InvalidPathParam(name.to_string()))?;
                if identity.map(|i| i.user_id) != Some(id) {
                    return Err(AuthorizationError::OwnershipMismatch.into());
                }
            }
        }
    }
    Ok(())
}

/// Names listed in a `Connection` header are connection-scoped too.
fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect()
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(headers);
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || listed.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Inbound headers as sent upstream: no `Host`, no hop-by-hop headers and
/// never a client-supplied `X-User-ID`.
pub fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = strip_hop_by_hop(inbound);
    out.remove(header::HOST);
    out.remove(USER_ID_HEADER);
    out
}

/// Upstream response headers as relayed to the client.
pub fn relayed_headers(upstream: &HeaderMap) -> HeaderMap {
    strip_hop_by_hop(upstream)
}

#[cfg(test)]
mod tests {
    use storefront_core::models::auth::Role;

    use super::*;
    use crate::routing::{PathPattern, PathTemplate, Service};

    fn target(pattern: &str, rules: Vec<(String, ParamRule)>) -> (UpstreamTarget, PathPattern) {
        let target = UpstreamTarget {
            service: Service::Users,
            path: PathTemplate::parse(pattern).unwrap(),
            inject_identity: false,
            rules,
        };
        (target, PathPattern::parse(pattern).unwrap())
    }

    fn identity(user_id: Uuid) -> SessionIdentity {
        SessionIdentity {
            user_id,
            role: Role::User,
        }
    }

    #[test]
    fn uuid_rule_rejects_garbage() {
        let (t, p) = target("/orders/{id}", vec![("id".into(), ParamRule::Uuid)]);
        let bad = p.match_path("/orders/42").unwrap();
        assert!(matches!(
            check_path_params(&t, &bad, None),
            Err(GatewayError::Routing(RoutingError::InvalidPathParam(name))) if name == "id"
        ));

        let good = p.match_path(&format!("/orders/{}", Uuid::new_v4())).unwrap();
        assert!(check_path_params(&t, &good, None).is_ok());
    }

    #[test]
    fn owner_rule_compares_with_session() {
        let (t, p) = target("/users/{id}", vec![("id".into(), ParamRule::Owner)]);
        let me = Uuid::new_v4();

        let mine = p.match_path(&format!("/users/{me}")).unwrap();
        assert!(check_path_params(&t, &mine, Some(&identity(me))).is_ok());

        let theirs = p.match_path(&format!("/users/{}", Uuid::new_v4())).unwrap();
        assert!(matches!(
            check_path_params(&t, &theirs, Some(&identity(me))),
            Err(GatewayError::Authorization(AuthorizationError::OwnershipMismatch))
        ));

        let garbage = p.match_path("/users/me").unwrap();
        assert!(matches!(
            check_path_params(&t, &garbage, Some(&identity(me))),
            Err(GatewayError::Routing(RoutingError::InvalidPathParam(_)))
        ));
    }

    #[test]
    fn verbatim_params_pass() {
        let (t, p) = target("/products/{id}", vec![]);
        let params = p.match_path("/products/anything").unwrap();
        assert!(check_path_params(&t, &params, None).is_ok());
    }

    #[test]
    fn forwarded_headers_drop_host_hop_by_hop_and_identity() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace"));
        inbound.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        inbound.insert("x-trace", HeaderValue::from_static("1"));
        inbound.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        inbound.insert(USER_ID_HEADER, HeaderValue::from_static("forged"));
        inbound.insert(header::COOKIE, HeaderValue::from_static("a=1; b=2"));
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        inbound.append("x-custom", HeaderValue::from_static("one"));
        inbound.append("x-custom", HeaderValue::from_static("two"));

        let out = forwarded_headers(&inbound);
        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get("keep-alive").is_none());
        assert!(out.get("x-trace").is_none());
        assert!(out.get(header::TRANSFER_ENCODING).is_none());
        assert!(out.get(USER_ID_HEADER).is_none());
        assert_eq!(out.get(header::COOKIE).unwrap(), "a=1; b=2");
        assert_eq!(out.get(header::AUTHORIZATION).unwrap(), "Bearer t");
        assert_eq!(out.get_all("x-custom").iter().count(), 2);
    }

    #[test]
    fn relayed_headers_keep_cookies_and_types() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let out = relayed_headers(&upstream);
        assert_eq!(out.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(out.get_all(header::SET_COOKIE).iter().count(), 2);
        assert!(out.get(header::TRANSFER_ENCODING).is_none());
    }

    #[test]
    fn url_joins_base_path_and_query() {
        assert_eq!(
            upstream_url("http://cart:8083", "/api/cart", Some("page=2&x=y")),
            "http://cart:8083/api/cart?page=2&x=y"
        );
        assert_eq!(upstream_url("http://cart", "/api/cart", None), "http://cart/api/cart");
    }

    #[test]
    fn base_urls_are_validated() {
        assert_eq!(base_url("http://users:8081/").unwrap(), "http://users:8081");
        assert_eq!(base_url("https://users/v1").unwrap(), "https://users/v1");
        assert!(base_url("users:8081").is_err());
        assert!(base_url("ftp://users").is_err());
        assert!(base_url("http://users?x=1").is_err());
        assert!(base_url("not a url").is_err());
    }
}
