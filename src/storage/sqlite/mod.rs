//! SQLite storage implementations
//!
//! SQLite is suitable for single-instance deployments and development.
//! Timestamps are stored as fixed-width RFC 3339 text in UTC so that string
//! comparison in SQL orders them chronologically.

mod clients;
mod tokens;

use crate::errors::StorageError;
use crate::oauth::types::{AuthorizationGrant, Client, TokenPair};
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

pub use clients::SqliteClientStore;
pub use tokens::SqliteTokenStore;

/// Format a timestamp for storage
pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("Invalid {} timestamp: {}", field, e)))
}

/// SQLite OAuth storage implementation
pub struct SqliteOAuthStorage {
    pool: SqlitePool,
    client_store: Arc<SqliteClientStore>,
    token_store: Arc<SqliteTokenStore>,
}

impl SqliteOAuthStorage {
    /// Create a new SQLite OAuth storage instance
    pub fn new(pool: SqlitePool) -> Self {
        let client_store = Arc::new(SqliteClientStore::new(pool.clone()));
        let token_store = Arc::new(SqliteTokenStore::new(pool.clone()));

        Self {
            pool,
            client_store,
            token_store,
        }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl ClientStore for SqliteOAuthStorage {
    async fn create_client(&self, client: &Client) -> Result<()> {
        self.client_store.create_client(client).await
    }

    async fn get_client(&self, client_id: &str) -> Result<Client> {
        self.client_store.get_client(client_id).await
    }

    async fn update_client(&self, client: &Client) -> Result<()> {
        self.client_store.update_client(client).await
    }

    async fn remove_client(&self, client_id: &str) -> Result<()> {
        self.client_store.remove_client(client_id).await
    }

    async fn list_clients(&self, limit: Option<usize>) -> Result<Vec<Client>> {
        self.client_store.list_clients(limit).await
    }
}

#[async_trait]
impl TokenStore for SqliteOAuthStorage {
    async fn save_authorization(&self, grant: &AuthorizationGrant) -> Result<()> {
        self.token_store.save_authorization(grant).await
    }

    async fn load_authorization(&self, code: &str) -> Result<AuthorizationGrant> {
        self.token_store.load_authorization(code).await
    }

    async fn remove_authorization(&self, code: &str) -> Result<()> {
        self.token_store.remove_authorization(code).await
    }

    async fn save_token_pair(&self, pair: &TokenPair) -> Result<()> {
        self.token_store.save_token_pair(pair).await
    }

    async fn load_access(&self, access_token: &str) -> Result<TokenPair> {
        self.token_store.load_access(access_token).await
    }

    async fn load_by_refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.token_store.load_by_refresh(refresh_token).await
    }

    async fn remove_token_pair(&self, access_token: &str) -> Result<()> {
        self.token_store.remove_token_pair(access_token).await
    }

    async fn remove_by_refresh(&self, refresh_token: &str) -> Result<()> {
        self.token_store.remove_by_refresh(refresh_token).await
    }

    async fn exchange_authorization(&self, code: &str, pair: &TokenPair) -> Result<()> {
        self.token_store.exchange_authorization(code, pair).await
    }

    async fn rotate_token_pair(&self, refresh_token: &str, pair: &TokenPair) -> Result<()> {
        self.token_store.rotate_token_pair(refresh_token, pair).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.token_store.purge_expired(now).await
    }
}

impl OAuthStorage for SqliteOAuthStorage {}
