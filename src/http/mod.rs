//! Axum HTTP server handlers for the authorization, token and introspection endpoints.

pub mod context;
mod handler_authorize;
mod handler_clients;
mod handler_token;
mod handler_verify;
pub mod server;

pub use context::AppState;
pub use server::build_router;
