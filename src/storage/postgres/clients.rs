//! PostgreSQL implementation for client storage

use crate::errors::StorageError;
use crate::oauth::types::{Client, Metadata};
use crate::storage::traits::{ClientStore, Result};
use crate::storage::{database_error, insert_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};

/// PostgreSQL implementation of client storage
pub struct PostgresClientStore {
    pool: PgPool,
}

impl PostgresClientStore {
    /// Create a new PostgreSQL client store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_client(row: &PgRow) -> Result<Client> {
        let metadata: Vec<u8> = row
            .try_get("metadata")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get metadata: {}", e)))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get created_at: {}", e)))?;

        Ok(Client {
            id: row
                .try_get("id")
                .map_err(|e| StorageError::DatabaseError(format!("Failed to get id: {}", e)))?,
            secret: row
                .try_get("secret")
                .map_err(|e| StorageError::DatabaseError(format!("Failed to get secret: {}", e)))?,
            redirect_uri: row.try_get("redirect_uri").map_err(|e| {
                StorageError::DatabaseError(format!("Failed to get redirect_uri: {}", e))
            })?,
            metadata: Metadata::new(metadata),
            created_at,
        })
    }
}

#[async_trait]
impl ClientStore for PostgresClientStore {
    async fn create_client(&self, client: &Client) -> Result<()> {
        sqlx::query(
            "INSERT INTO client (id, secret, redirect_uri, metadata, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&client.id)
        .bind(&client.secret)
        .bind(&client.redirect_uri)
        .bind(client.metadata.as_bytes())
        .bind(client.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            insert_error(e, &client.id, || {
                StorageError::AlreadyExists(format!("client {}", client.id))
            })
        })?;

        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Client> {
        let row = sqlx::query("SELECT * FROM client WHERE id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        match row {
            Some(row) => Self::row_to_client(&row),
            None => Err(StorageError::NotFound(format!("client {}", client_id))),
        }
    }

    async fn update_client(&self, client: &Client) -> Result<()> {
        let result = sqlx::query(
            "UPDATE client SET secret = $1, redirect_uri = $2, metadata = $3 WHERE id = $4",
        )
        .bind(&client.secret)
        .bind(&client.redirect_uri)
        .bind(client.metadata.as_bytes())
        .bind(&client.id)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("client {}", client.id)));
        }

        Ok(())
    }

    async fn remove_client(&self, client_id: &str) -> Result<()> {
        // Token rows go with the client through ON DELETE CASCADE.
        sqlx::query("DELETE FROM client WHERE id = $1")
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn list_clients(&self, limit: Option<usize>) -> Result<Vec<Client>> {
        let limit = limit.map(|l| l as i64);
        let rows = sqlx::query("SELECT * FROM client ORDER BY created_at, id LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        rows.iter().map(Self::row_to_client).collect()
    }
}
