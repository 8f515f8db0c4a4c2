//! Gateway error types.
//!
//! Every error is terminal for the request and maps to exactly one status and
//! a fixed client-facing message. Underlying causes are logged, never echoed.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use storefront_core::auth::{AuthError, RefreshError, TokenError};
use thiserror::Error;
use tracing::{error, warn};

use crate::routing::RouteConfigError;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, GatewayError>;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Bearer credential could not be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("authorization header missing")]
    Missing,

    #[error("authorization header is not a bearer credential")]
    Malformed,
}

/// Identity was established but may not perform the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("role does not satisfy the route's trust level")]
    InsufficientRole,

    #[error("resource belongs to another user")]
    OwnershipMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no route matches the request")]
    NoMatch,

    #[error("path parameter `{0}` is malformed")]
    InvalidPathParam(String),
}

/// Failure talking to a backend service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("upstream response could not be relayed: {0}")]
    BadStatus(String),
}

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("refresh cookie missing")]
    MissingRefreshCookie,

    #[error("incorrect email or password")]
    InvalidLogin,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Status code, machine-readable code and client-facing message.
    pub fn parts(&self) -> (StatusCode, &'static str, &'static str) {
        use GatewayError as E;
        match self {
            E::Credential(_) => (StatusCode::UNAUTHORIZED, "unauthorized", "missing or invalid token"),
            E::Token(TokenError::Signing(_) | TokenError::InvalidLifetime) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
            E::Token(_) => (StatusCode::UNAUTHORIZED, "unauthorized", "invalid or expired token"),
            E::Refresh(RefreshError::Storage(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
            E::Refresh(_) => (StatusCode::UNAUTHORIZED, "unauthorized", "invalid refresh token"),
            E::MissingRefreshCookie => {
                (StatusCode::UNAUTHORIZED, "unauthorized", "missing refresh token")
            }
            E::InvalidLogin => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Incorrect email or password",
            ),
            E::Authorization(AuthorizationError::InsufficientRole) => {
                (StatusCode::FORBIDDEN, "forbidden", "admin access required")
            }
            E::Authorization(AuthorizationError::OwnershipMismatch) => {
                (StatusCode::FORBIDDEN, "forbidden", "access to this resource is not allowed")
            }
            E::Routing(RoutingError::NoMatch) => (StatusCode::NOT_FOUND, "not_found", "not found"),
            E::Routing(RoutingError::InvalidPathParam(_)) => {
                (StatusCode::BAD_REQUEST, "bad_request", "invalid path parameter")
            }
            E::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", "Couldn't decode parameters"),
            E::Upstream(_) => (StatusCode::BAD_GATEWAY, "bad_gateway", "Service unavailable"),
            E::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for GatewayError {
    fn from(e: AuthError) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

/// Errors raised while assembling the gateway at start.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid route table: {0}")]
    Routes(#[from] RouteConfigError),

    #[error("invalid upstream URL `{url}`: {reason}")]
    UpstreamUrl { url: String, reason: String },

    #[error("HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(e: GatewayError) -> StatusCode {
        e.into_response().status()
    }

    #[test]
    fn authentication_failures_are_401() {
        assert_eq!(status(CredentialError::Missing.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status(CredentialError::Malformed.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status(TokenError::Expired.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status(TokenError::BadSignature.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status(TokenError::InvalidSubject.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status(RefreshError::Revoked.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status(GatewayError::MissingRefreshCookie), StatusCode::UNAUTHORIZED);
        assert_eq!(status(GatewayError::InvalidLogin), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn authorization_failures_are_403() {
        assert_eq!(
            status(AuthorizationError::InsufficientRole.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(AuthorizationError::OwnershipMismatch.into()),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn routing_and_upstream_statuses() {
        assert_eq!(status(RoutingError::NoMatch.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            status(RoutingError::InvalidPathParam("orderID".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(UpstreamError::Unreachable("refused".into()).into()),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn storage_failures_are_500() {
        assert_eq!(
            status(RefreshError::Storage("pool closed".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(TokenError::Signing("boom".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn internal_cause_is_not_echoed() {
        let resp = GatewayError::Internal("db password is hunter2".into()).into_response();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("internal_error"));
    }
}
