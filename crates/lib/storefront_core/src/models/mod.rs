//! Domain models shared by the gateway and its storage collaborators.

pub mod auth;
