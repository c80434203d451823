//! Storage trait definitions for clients and tokens.
//!
//! Defines async storage interfaces for the client registry and the token
//! lifecycle store that can be implemented by various backend providers.

use crate::errors::StorageError;
use crate::oauth::types::{AuthorizationGrant, Client, TokenPair};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Trait for storing and retrieving registered clients
#[async_trait]
pub trait ClientStore {
    /// Register a new client. Fails with `AlreadyExists` when the id is taken.
    async fn create_client(&self, client: &Client) -> Result<()>;

    /// Retrieve a client by id. Fails with `NotFound` when absent.
    async fn get_client(&self, client_id: &str) -> Result<Client>;

    /// Replace secret, redirect URI and metadata. The id and creation time are kept.
    async fn update_client(&self, client: &Client) -> Result<()>;

    /// Delete a client and every token that references it.
    async fn remove_client(&self, client_id: &str) -> Result<()>;

    /// List clients ordered by creation time
    async fn list_clients(&self, limit: Option<usize>) -> Result<Vec<Client>>;
}

/// Trait for the authorization grant and token pair lifecycle
#[async_trait]
pub trait TokenStore {
    /// Insert a new authorization grant. Fails with `DuplicateCode` if the code exists.
    async fn save_authorization(&self, grant: &AuthorizationGrant) -> Result<()>;

    /// Load a grant. Expired grants are reported as `Expired`, not `NotFound`.
    async fn load_authorization(&self, code: &str) -> Result<AuthorizationGrant>;

    /// Delete a grant. Deleting an absent grant is not an error.
    async fn remove_authorization(&self, code: &str) -> Result<()>;

    /// Insert a new token pair
    async fn save_token_pair(&self, pair: &TokenPair) -> Result<()>;

    /// Load a pair by its access token
    async fn load_access(&self, access_token: &str) -> Result<TokenPair>;

    /// Load a pair by its refresh token
    async fn load_by_refresh(&self, refresh_token: &str) -> Result<TokenPair>;

    /// Delete the whole pair owning the access token
    async fn remove_token_pair(&self, access_token: &str) -> Result<()>;

    /// Delete the whole pair owning the refresh token
    async fn remove_by_refresh(&self, refresh_token: &str) -> Result<()>;

    /// Atomically consume an unexpired grant and insert the pair issued for it.
    ///
    /// Exactly one concurrent caller can consume a given code; the others get
    /// `NotFound` and nothing is inserted on their behalf.
    async fn exchange_authorization(&self, code: &str, pair: &TokenPair) -> Result<()>;

    /// Atomically replace the unexpired pair owning `refresh_token` with `pair`.
    async fn rotate_token_pair(&self, refresh_token: &str, pair: &TokenPair) -> Result<()>;

    /// Delete every grant and pair with `expires_at <= now`, returning the count.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Combined storage trait
pub trait OAuthStorage: ClientStore + TokenStore + Send + Sync {}
