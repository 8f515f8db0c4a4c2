//! # storefront_core
//!
//! Identity and session logic for the storefront edge gateway: access token
//! signing, the refresh token store, and the user/password collaborators.

pub mod auth;
pub mod clock;
pub mod migrate;
pub mod models;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
