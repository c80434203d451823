//! grantkeep library crate.
//!
//! Issues, validates and rotates OAuth2 credentials: authorization codes,
//! access tokens and refresh tokens, persisted through a pluggable storage layer.

pub mod config;
pub mod errors;
pub mod http;
pub mod oauth;
pub mod storage;
