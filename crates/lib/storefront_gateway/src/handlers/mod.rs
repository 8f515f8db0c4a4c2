//! HTTP request handlers.

pub mod auth;
pub mod gateway;
pub mod health;
