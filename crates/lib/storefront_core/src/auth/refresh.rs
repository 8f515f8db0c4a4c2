//! Refresh token store.
//!
//! Opaque long-lived tokens bound to a user. Tokens are never rotated: the
//! same string keeps resolving until its fixed expiry or an explicit revoke.
//! Rows are keyed by the SHA-256 digest of the token, never the plaintext.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};

use super::RefreshError;
use crate::clock::Clock;
use crate::models::auth::{RefreshTokenRecord, UserId};

/// Length of a generated refresh token (alphanumeric, ~381 bits of entropy).
pub const REFRESH_TOKEN_LEN: usize = 64;

/// Issue, resolve and revoke opaque refresh tokens.
///
/// Implementations must keep calls for different tokens independent and make
/// a revoke visible to every later resolve.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new token for `user_id` expiring `ttl` from now.
    async fn issue(&self, user_id: UserId, ttl: Duration) -> Result<String, RefreshError>;

    /// Return the owning user if the token exists, is not revoked and not expired.
    async fn resolve(&self, token: &str) -> Result<UserId, RefreshError>;

    /// Mark the token revoked. Revoking an already revoked token succeeds.
    async fn revoke(&self, token: &str) -> Result<(), RefreshError>;
}

/// Generate a cryptographically random refresh token.
pub fn generate_refresh_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Expiry instant for a token issued at `now`.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Decide whether a stored row still grants a session at `now`.
///
/// Revocation wins over expiry; the row is expired from `expires_at` on.
pub(crate) fn check_record(
    record: &RefreshTokenRecord,
    now: DateTime<Utc>,
) -> Result<UserId, RefreshError> {
    if record.revoked {
        return Err(RefreshError::Revoked);
    }
    if now >= record.expires_at {
        return Err(RefreshError::Expired);
    }
    Ok(record.user_id)
}

/// In-memory store. Each token hash is its own map entry, so operations on
/// different tokens only meet at DashMap shard level.
pub struct MemoryRefreshTokenStore {
    rows: DashMap<String, RefreshTokenRecord>,
    clock: Arc<dyn Clock>,
}

impl MemoryRefreshTokenStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: DashMap::new(),
            clock,
        }
    }

    /// Number of rows held, revoked ones included.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn issue(&self, user_id: UserId, ttl: Duration) -> Result<String, RefreshError> {
        let token = generate_refresh_token();
        let token_hash = hash_refresh_token(&token);
        let now = self.clock.now();

        match self.rows.entry(token_hash.clone()) {
            Entry::Occupied(_) => Err(RefreshError::Storage(
                "refresh token hash already present".into(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(RefreshTokenRecord {
                    token_hash,
                    user_id,
                    expires_at: expiry_after(now, ttl),
                    revoked: false,
                    created_at: now,
                });
                Ok(token)
            }
        }
    }

    async fn resolve(&self, token: &str) -> Result<UserId, RefreshError> {
        let now = self.clock.now();
        let row = self
            .rows
            .get(&hash_refresh_token(token))
            .ok_or(RefreshError::NotFound)?;
        check_record(&row, now)
    }

    async fn revoke(&self, token: &str) -> Result<(), RefreshError> {
        let mut row = self
            .rows
            .get_mut(&hash_refresh_token(token))
            .ok_or(RefreshError::NotFound)?;
        row.revoked = true;
        Ok(())
    }
}
