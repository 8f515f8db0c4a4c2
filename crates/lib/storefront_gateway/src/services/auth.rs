//! Login, refresh and revoke flows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storefront_core::auth::RefreshError;
use storefront_core::models::auth::{UserId, UserRecord};
use tracing::{debug, info};

use crate::AppState;
use crate::error::{AppResult, GatewayError};

/// Body of `POST /api/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Public view of a user. Role and password digest stay inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for UserResponse {
    fn from(u: UserRecord) -> Self {
        Self {
            id: u.id,
            email: u.email,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Successful login: response body plus the refresh token for the cookie.
#[derive(Debug)]
pub struct LoginOutcome {
    pub response: LoginResponse,
    pub refresh_token: String,
}

/// Check credentials and open a session.
///
/// Unknown email and wrong password fail identically.
pub async fn login(state: &AppState, request: LoginRequest) -> AppResult<LoginOutcome> {
    let Some(credentials) = state.users.find_by_email(&request.email).await? else {
        debug!("login for unknown email");
        return Err(GatewayError::InvalidLogin);
    };

    let hasher = state.passwords.clone();
    let digest = credentials.password_hash;
    let password = request.password;
    let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
        .await
        .map_err(|e| GatewayError::Internal(format!("password check task: {e}")))??;
    if !matches {
        debug!(user_id = %credentials.user.id, "login with wrong password");
        return Err(GatewayError::InvalidLogin);
    }

    let user = credentials.user;
    let token = state
        .tokens
        .issue(user.id, user.role, state.config.access_token_ttl)?;
    let refresh_token = state
        .refresh_tokens
        .issue(user.id, state.config.refresh_token_ttl)
        .await?;

    info!(user_id = %user.id, role = %user.role, "user logged in");
    Ok(LoginOutcome {
        response: LoginResponse {
            user: user.into(),
            token,
        },
        refresh_token,
    })
}

/// Mint a new access token from a refresh token. The refresh token is kept.
pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<TokenResponse> {
    let user_id = state.refresh_tokens.resolve(refresh_token).await?;
    let Some(user) = state.users.find_by_id(user_id).await? else {
        debug!(%user_id, "refresh token owner no longer exists");
        return Err(RefreshError::NotFound.into());
    };

    let token = state
        .tokens
        .issue(user.id, user.role, state.config.access_token_ttl)?;
    debug!(user_id = %user.id, "access token refreshed");
    Ok(TokenResponse { token })
}

/// Revoke a refresh token. Revoking twice is not an error.
pub async fn revoke(state: &AppState, refresh_token: &str) -> AppResult<()> {
    state.refresh_tokens.revoke(refresh_token).await?;
    info!("refresh token revoked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use storefront_core::auth::password::{BcryptHasher, PasswordHasher};
    use storefront_core::auth::refresh::MemoryRefreshTokenStore;
    use storefront_core::auth::users::MemoryUserDirectory;
    use storefront_core::clock::ManualClock;
    use storefront_core::models::auth::Role;

    use super::*;
    use crate::config::tests::test_config;

    fn state() -> (AppState, Arc<MemoryUserDirectory>) {
        let clock = Arc::new(ManualClock::default());
        let users = Arc::new(MemoryUserDirectory::new());
        let hasher = BcryptHasher::new(4);
        users.insert("ann@example.com", hasher.hash("correct horse").unwrap(), Role::User);
        let state = AppState::new(
            test_config(),
            clock.clone(),
            Arc::new(MemoryRefreshTokenStore::new(clock)),
            users.clone(),
            Arc::new(hasher),
        )
        .unwrap();
        (state, users)
    }

    fn credentials(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn login_issues_both_tokens() {
        let (state, _) = state();
        let outcome = login(&state, credentials("ann@example.com", "correct horse"))
            .await
            .unwrap();
        assert_eq!(outcome.response.user.email, "ann@example.com");
        assert_eq!(outcome.refresh_token.len(), 64);

        let identity = state.tokens.verify(&outcome.response.token).unwrap();
        assert_eq!(identity.user_id, outcome.response.user.id);
        assert_eq!(identity.role, Role::User);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_alike() {
        let (state, _) = state();
        let a = login(&state, credentials("ann@example.com", "wrong")).await.unwrap_err();
        let b = login(&state, credentials("bob@example.com", "correct horse"))
            .await
            .unwrap_err();
        assert_eq!(a.parts(), b.parts());
        assert!(matches!(a, GatewayError::InvalidLogin));
    }

    #[tokio::test]
    async fn refresh_then_revoke() {
        let (state, _) = state();
        let outcome = login(&state, credentials("ann@example.com", "correct horse"))
            .await
            .unwrap();

        let first = refresh(&state, &outcome.refresh_token).await.unwrap();
        assert!(state.tokens.verify(&first.token).is_ok());
        // Not rotated: the same refresh token still works.
        refresh(&state, &outcome.refresh_token).await.unwrap();

        revoke(&state, &outcome.refresh_token).await.unwrap();
        revoke(&state, &outcome.refresh_token).await.unwrap();
        let err = refresh(&state, &outcome.refresh_token).await.unwrap_err();
        assert!(matches!(err, GatewayError::Refresh(RefreshError::Revoked)));
    }

    #[tokio::test]
    async fn refresh_carries_the_current_role() {
        let (state, users) = state();
        let hasher = BcryptHasher::new(4);
        let admin = users.insert("root@example.com", hasher.hash("pw").unwrap(), Role::Admin);
        let token = state
            .refresh_tokens
            .issue(admin.id, state.config.refresh_token_ttl)
            .await
            .unwrap();

        let refreshed = refresh(&state, &token).await.unwrap();
        assert_eq!(state.tokens.verify(&refreshed.token).unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn unknown_refresh_token() {
        let (state, _) = state();
        let err = refresh(&state, "nope").await.unwrap_err();
        assert!(matches!(err, GatewayError::Refresh(RefreshError::NotFound)));
        let err = revoke(&state, "nope").await.unwrap_err();
        assert!(matches!(err, GatewayError::Refresh(RefreshError::NotFound)));
    }
}
