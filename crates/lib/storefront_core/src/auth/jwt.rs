//! Access token issuance and verification (HS256 JWT).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::TokenError;
use crate::clock::Clock;
use crate::models::auth::{IdentityClaims, Role, SessionIdentity, UserId};

/// Issuer written into every access token unless configured otherwise.
pub const DEFAULT_ISSUER: &str = "storefront";

/// Signs and verifies access tokens with a single shared secret.
///
/// Holds no per-token state: a token is valid exactly when its signature
/// matches and the clock has not reached its expiry.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(secret: &[u8], issuer: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            clock,
        }
    }

    /// Sign a token for `user_id` valid for `ttl` from now.
    pub fn issue(&self, user_id: UserId, role: Role, ttl: Duration) -> Result<String, TokenError> {
        let lifetime = i64::try_from(ttl.as_secs()).map_err(|_| TokenError::InvalidLifetime)?;
        if lifetime < 1 {
            return Err(TokenError::InvalidLifetime);
        }

        let now = self.clock.now().timestamp();
        let claims = IdentityClaims {
            sub: user_id.to_string(),
            role,
            iss: self.issuer.clone(),
            iat: now,
            exp: now.saturating_add(lifetime),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token and return the identity it carries.
    ///
    /// Anything but three dot-separated segments is `Malformed`. The
    /// signature is then checked over the raw `header.payload` text before
    /// either part is decoded, so any altered byte of a signed token fails
    /// with `BadSignature` rather than a decoding error.
    pub fn verify(&self, token: &str) -> Result<SessionIdentity, TokenError> {
        let now = self.clock.now().timestamp();

        if token.split('.').count() != 3 {
            return Err(TokenError::Malformed);
        }
        let (message, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        let signature_ok = jsonwebtoken::crypto::verify(
            signature,
            message.as_bytes(),
            &self.decoding,
            Algorithm::HS256,
        )
        .map_err(|_| TokenError::BadSignature)?;
        if !signature_ok {
            return Err(TokenError::BadSignature);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let claims = decode::<IdentityClaims>(token, &self.decoding, &validation)
            .map_err(|e| {
                debug!(error = %e, "signed token failed claim validation");
                TokenError::Malformed
            })?
            .claims;

        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| TokenError::InvalidSubject)?;
        Ok(SessionIdentity {
            user_id,
            role: claims.role,
        })
    }
}

/// Resolve the signing secret: `SECRET_KEY` → `JWT_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    for var in ["SECRET_KEY", "JWT_SECRET"] {
        if let Ok(secret) = std::env::var(var)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(&secret_path, &secret) {
        Ok(()) => info!(path = %secret_path.display(), "generated new JWT secret"),
        Err(e) => warn!(path = %secret_path.display(), error = %e, "could not persist generated JWT secret"),
    }
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("storefront")
        .join("jwt-secret")
}
