//! In-memory storage implementation
//!
//! Suitable for development and testing. All state lives behind one mutex, so
//! every compound operation is atomic by construction.

mod oauth;

pub use oauth::MemoryOAuthStorage;
