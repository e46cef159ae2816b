//! Credential lifecycle: persistence, authorization server calls, refresh and activation.

pub mod activation;
pub mod auth_client;
pub mod credential;
pub mod manager;
pub mod token_store;
