//! PostgreSQL-backed refresh token store and user directory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::refresh::{
    RefreshTokenStore, check_record, expiry_after, generate_refresh_token, hash_refresh_token,
};
use super::users::UserDirectory;
use super::{AuthError, RefreshError};
use crate::clock::Clock;
use crate::models::auth::{RefreshTokenRecord, Role, UserCredentials, UserId, UserRecord};

type UserRow = (Uuid, String, String, DateTime<Utc>, DateTime<Utc>);

/// Refresh tokens in the `refresh_tokens` table (unique index on `token_hash`).
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn issue(&self, user_id: UserId, ttl: Duration) -> Result<String, RefreshError> {
        let token = generate_refresh_token();
        let now = self.clock.now();
        sqlx::query(
            "INSERT INTO refresh_tokens (id, token_hash, user_id, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::now_v7())
        .bind(hash_refresh_token(&token))
        .bind(user_id)
        .bind(expiry_after(now, ttl))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(token)
    }

    async fn resolve(&self, token: &str) -> Result<UserId, RefreshError> {
        let token_hash = hash_refresh_token(token);
        let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>, Option<DateTime<Utc>>, DateTime<Utc>)>(
            "SELECT user_id, expires_at, revoked_at, created_at \
             FROM refresh_tokens \
             WHERE token_hash = $1",
        )
        .bind(&token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let (user_id, expires_at, revoked_at, created_at) = row.ok_or(RefreshError::NotFound)?;
        let record = RefreshTokenRecord {
            token_hash,
            user_id,
            expires_at,
            revoked: revoked_at.is_some(),
            created_at,
        };
        check_record(&record, self.clock.now())
    }

    async fn revoke(&self, token: &str) -> Result<(), RefreshError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = COALESCE(revoked_at, $2) \
             WHERE token_hash = $1",
        )
        .bind(hash_refresh_token(token))
        .bind(self.clock.now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RefreshError::NotFound);
        }
        Ok(())
    }
}

/// Read-only view of the `users` table shared with the user service.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row((id, email, role, created_at, updated_at): UserRow) -> Result<UserRecord, AuthError> {
    let role = role.parse::<Role>().map_err(|e| {
        warn!(user_id = %id, error = %e, "user row carries an unknown role");
        AuthError::Internal(e.to_string())
    })?;
    Ok(UserRecord {
        id,
        email,
        role,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, AuthError> {
        let row = sqlx::query_as::<_, (Uuid, String, String, DateTime<Utc>, DateTime<Utc>, String)>(
            "SELECT id, email, role, created_at, updated_at, hashed_password \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, email, role, created_at, updated_at, password_hash)| {
            Ok(UserCredentials {
                user: user_from_row((id, email, role, created_at, updated_at))?,
                password_hash,
            })
        })
        .transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, role, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_row).transpose()
    }
}
