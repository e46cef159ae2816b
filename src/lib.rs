//! # Thermostat Gateway Library
//!
//! Fronts a thermostat vendor's cloud API: keeps the OAuth refresh token on disk,
//! refreshes access tokens with a single-flight gate, issues authenticated upstream
//! calls and serves the activation UI plus a health endpoint.
//!
//! Modules:
//! - `config`: YAML/env configuration and validation
//! - `credentials`: token store, auth client, credential manager, device activation
//! - `upstream`: authenticated vendor API client
//! - `health`: liveness and authorization snapshot
//! - `server`: axum routes and serving loop

pub mod config;
pub mod credentials;
pub mod error;
pub mod health;
pub mod helpers;
pub mod observability;
pub mod resilience;
pub mod server;
pub mod upstream;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::config::settings::ServiceConfig;
pub use crate::error::{GatewayError, GatewayResult};
