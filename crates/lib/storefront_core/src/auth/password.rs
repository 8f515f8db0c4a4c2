//! Password hashing collaborator.
//!
//! The gateway treats the primitive as a black box behind [`PasswordHasher`];
//! the shipped implementation is bcrypt.

use super::AuthError;

/// Default bcrypt cost factor.
pub const BCRYPT_COST: u32 = 10;

/// `hash(plaintext) -> digest`, `verify(plaintext, digest) -> bool`.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError>;

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError>;
}

/// bcrypt-backed hasher.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(BCRYPT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        bcrypt::hash(plaintext, self.cost).map_err(|e| AuthError::Hashing(format!("bcrypt hash: {e}")))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError> {
        bcrypt::verify(plaintext, digest)
            .map_err(|e| AuthError::Hashing(format!("bcrypt verify: {e}")))
    }
}
