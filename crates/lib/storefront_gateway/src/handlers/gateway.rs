//! Single entry point for every inbound request.
//!
//! Match the route, apply its trust level, then hand the request to a local
//! endpoint or the proxy. Unmatched requests are rejected before any
//! credential is looked at.

use axum::extract::{Request, State};
use axum::handler::Handler;
use axum::response::Response;
use tracing::debug;

use super::{auth, health};
use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::enforce;
use crate::routing::{LocalEndpoint, RouteTarget};

/// Router fallback: dispatch through the route table.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> AppResult<Response> {
    let routes = state.routes.clone();
    let matched = routes.find(request.method(), request.uri().path())?;
    let identity = enforce(&state.tokens, matched.route.trust, request.headers())?;
    debug!(
        route = matched.route.pattern.as_str(),
        user_id = ?identity.map(|i| i.user_id),
        "route matched"
    );

    match &matched.route.target {
        RouteTarget::Local(endpoint) => Ok(serve_local(*endpoint, state, request).await),
        RouteTarget::Upstream(target) => {
            state
                .proxy
                .forward(target, &matched.params, identity, request)
                .await
        }
    }
}

async fn serve_local(endpoint: LocalEndpoint, state: AppState, request: Request) -> Response {
    match endpoint {
        LocalEndpoint::Health => health::health.call(request, state).await,
        LocalEndpoint::Login => auth::login_handler.call(request, state).await,
        LocalEndpoint::Refresh => auth::refresh_handler.call(request, state).await,
        LocalEndpoint::Revoke => auth::revoke_handler.call(request, state).await,
    }
}
