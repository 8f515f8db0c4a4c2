//! Bearer token extraction, verification and role checks.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use storefront_core::auth::jwt::TokenService;
use storefront_core::models::auth::SessionIdentity;
use tracing::debug;

use crate::error::{AuthorizationError, CredentialError, GatewayError};
use crate::routing::TrustLevel;

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, CredentialError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(CredentialError::Missing)?
        .to_str()
        .map_err(|_| CredentialError::Malformed)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(CredentialError::Malformed)?
        .trim();
    if token.is_empty() {
        return Err(CredentialError::Malformed);
    }
    Ok(token)
}

/// Establish the identity a route requires.
///
/// Public routes return `None` without looking at the headers. Any other
/// level needs a verified token whose role the level permits.
pub fn enforce(
    tokens: &TokenService,
    trust: TrustLevel,
    headers: &HeaderMap,
) -> Result<Option<SessionIdentity>, GatewayError> {
    if !trust.requires_identity() {
        return Ok(None);
    }

    let token = bearer_token(headers)?;
    let identity = tokens.verify(token)?;
    if !trust.permits(identity.role) {
        debug!(user_id = %identity.user_id, role = %identity.role, ?trust, "role rejected");
        return Err(AuthorizationError::InsufficientRole.into());
    }
    Ok(Some(identity))
}
