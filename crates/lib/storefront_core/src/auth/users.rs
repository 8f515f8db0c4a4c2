//! User directory collaborator.
//!
//! The user service owns user records; the gateway only needs to look users
//! up by email (login) and by id (role resolution on refresh).

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{Role, UserCredentials, UserId, UserRecord};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, AuthError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, AuthError>;
}

/// In-memory directory used by tests and local runs.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashMap<UserId, UserCredentials>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with an already hashed password.
    pub fn insert(&self, email: &str, password_hash: String, role: Role) -> UserRecord {
        let now = Utc::now();
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                password_hash,
            },
        );
        user
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, AuthError> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.user.email == email)
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.users.get(&id).map(|entry| entry.user.clone()))
    }
}
