//! Request policy applied before a route's target runs.

pub mod auth;
