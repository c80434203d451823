//! SQLite implementation for client storage

use super::{format_timestamp, parse_timestamp};
use crate::errors::StorageError;
use crate::oauth::types::{Client, Metadata};
use crate::storage::traits::{ClientStore, Result};
use crate::storage::{database_error, insert_error};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

/// SQLite implementation of client storage
pub struct SqliteClientStore {
    pool: SqlitePool,
}

impl SqliteClientStore {
    /// Create a new SQLite client store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Convert SQLite row to Client
    fn row_to_client(row: &SqliteRow) -> Result<Client> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get id: {}", e)))?;
        let secret: String = row
            .try_get("secret")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get secret: {}", e)))?;
        let redirect_uri: String = row.try_get("redirect_uri").map_err(|e| {
            StorageError::DatabaseError(format!("Failed to get redirect_uri: {}", e))
        })?;
        let metadata: Vec<u8> = row
            .try_get("metadata")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get metadata: {}", e)))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get created_at: {}", e)))?;

        Ok(Client {
            id,
            secret,
            redirect_uri,
            metadata: Metadata::new(metadata),
            created_at: parse_timestamp("created_at", &created_at)?,
        })
    }
}

#[async_trait]
impl ClientStore for SqliteClientStore {
    async fn create_client(&self, client: &Client) -> Result<()> {
        sqlx::query(
            "INSERT INTO client (id, secret, redirect_uri, metadata, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&client.id)
        .bind(&client.secret)
        .bind(&client.redirect_uri)
        .bind(client.metadata.as_bytes())
        .bind(format_timestamp(&client.created_at))
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
        let row = sqlx::query("SELECT * FROM client WHERE id = ?")
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
        let result =
            sqlx::query("UPDATE client SET secret = ?, redirect_uri = ?, metadata = ? WHERE id = ?")
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
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        // Explicit so cascade holds even with foreign_keys off.
        sqlx::query("DELETE FROM token WHERE client_id = ?")
            .bind(client_id)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;

        sqlx::query("DELETE FROM client WHERE id = ?")
            .bind(client_id)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;

        tx.commit().await.map_err(database_error)?;
        Ok(())
    }

    async fn list_clients(&self, limit: Option<usize>) -> Result<Vec<Client>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query("SELECT * FROM client ORDER BY created_at, id LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        rows.iter().map(Self::row_to_client).collect()
    }
}
