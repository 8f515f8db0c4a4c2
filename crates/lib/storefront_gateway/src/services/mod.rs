//! Session business logic used by the local endpoints.

pub mod auth;
pub mod cookies;
