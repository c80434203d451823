//! SQLite implementation for authorization grant and token pair storage
//!
//! Both record kinds share the `token` table; the `kind` column says which one a
//! row holds and the conversion functions refuse rows of the wrong shape.

use super::{format_timestamp, parse_timestamp};
use crate::errors::StorageError;
use crate::oauth::types::{AuthorizationGrant, Metadata, TokenKind, TokenPair};
use crate::storage::traits::{Result, TokenStore};
use crate::storage::{database_error, insert_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};

/// SQLite implementation of the token store
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StorageError::DatabaseError(format!("Failed to get {}: {}", column, e)))
}

fn row_kind(row: &SqliteRow) -> Result<TokenKind> {
    let kind: String = get(row, "kind")?;
    TokenKind::try_from(kind.as_str()).map_err(StorageError::InvalidData)
}

/// Convert SQLite row to AuthorizationGrant
fn row_to_grant(row: &SqliteRow) -> Result<AuthorizationGrant> {
    if row_kind(row)? != TokenKind::Authorize {
        return Err(StorageError::InvalidData(
            "Expected an authorize row".to_string(),
        ));
    }
    let code: Option<String> = get(row, "code")?;
    let code =
        code.ok_or_else(|| StorageError::InvalidData("Authorize row without code".to_string()))?;
    let state: Option<String> = get(row, "state")?;
    let metadata: Vec<u8> = get(row, "metadata")?;
    let created_at: String = get(row, "created_at")?;
    let expires_at: String = get(row, "expires_at")?;

    Ok(AuthorizationGrant {
        code,
        client_id: get(row, "client_id")?,
        scope: get(row, "scope")?,
        redirect_uri: get(row, "redirect_uri")?,
        state: state.unwrap_or_default(),
        metadata: Metadata::new(metadata),
        created_at: parse_timestamp("created_at", &created_at)?,
        expires_at: parse_timestamp("expires_at", &expires_at)?,
    })
}

/// Convert SQLite row to TokenPair
fn row_to_pair(row: &SqliteRow) -> Result<TokenPair> {
    if row_kind(row)? != TokenKind::Access {
        return Err(StorageError::InvalidData("Expected an access row".to_string()));
    }
    let access_token: Option<String> = get(row, "access_token")?;
    let access_token = access_token.ok_or_else(|| {
        StorageError::InvalidData("Access row without access_token".to_string())
    })?;
    let metadata: Vec<u8> = get(row, "metadata")?;
    let created_at: String = get(row, "created_at")?;
    let expires_at: String = get(row, "expires_at")?;

    Ok(TokenPair {
        access_token,
        refresh_token: get(row, "refresh_token")?,
        client_id: get(row, "client_id")?,
        scope: get(row, "scope")?,
        redirect_uri: get(row, "redirect_uri")?,
        metadata: Metadata::new(metadata),
        created_at: parse_timestamp("created_at", &created_at)?,
        expires_at: parse_timestamp("expires_at", &expires_at)?,
    })
}

async fn insert_pair(conn: &mut SqliteConnection, pair: &TokenPair) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO token (
            client_id, kind, access_token, refresh_token, scope,
            redirect_uri, metadata, created_at, expires_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&pair.client_id)
    .bind(TokenKind::Access.as_str())
    .bind(&pair.access_token)
    .bind(&pair.refresh_token)
    .bind(&pair.scope)
    .bind(&pair.redirect_uri)
    .bind(pair.metadata.as_bytes())
    .bind(format_timestamp(&pair.created_at))
    .bind(format_timestamp(&pair.expires_at))
    .execute(conn)
    .await
    .map_err(|e| {
        insert_error(e, &pair.client_id, || {
            StorageError::AlreadyExists("token".to_string())
        })
    })?;

    Ok(())
}

impl SqliteTokenStore {
    /// Create a new SQLite token store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_pair(&self, column: &'static str, value: &str) -> Result<Option<TokenPair>> {
        let query = format!("SELECT * FROM token WHERE kind = 'access' AND {} = ?", column);
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        row.as_ref().map(row_to_pair).transpose()
    }

    fn check_pair(pair: Option<TokenPair>, what: &str) -> Result<TokenPair> {
        match pair {
            None => Err(StorageError::NotFound(what.to_string())),
            Some(pair) if pair.is_expired_at(Utc::now()) => {
                Err(StorageError::Expired(what.to_string()))
            }
            Some(pair) => Ok(pair),
        }
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn save_authorization(&self, grant: &AuthorizationGrant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO token (
                client_id, kind, code, scope, redirect_uri,
                state, metadata, created_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&grant.client_id)
        .bind(TokenKind::Authorize.as_str())
        .bind(&grant.code)
        .bind(&grant.scope)
        .bind(&grant.redirect_uri)
        .bind(&grant.state)
        .bind(grant.metadata.as_bytes())
        .bind(format_timestamp(&grant.created_at))
        .bind(format_timestamp(&grant.expires_at))
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, &grant.client_id, || StorageError::DuplicateCode))?;

        Ok(())
    }

    async fn load_authorization(&self, code: &str) -> Result<AuthorizationGrant> {
        let row = sqlx::query("SELECT * FROM token WHERE kind = 'authorize' AND code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        let grant = match row {
            Some(row) => row_to_grant(&row)?,
            None => return Err(StorageError::NotFound("authorization code".to_string())),
        };
        if grant.is_expired_at(Utc::now()) {
            return Err(StorageError::Expired("authorization code".to_string()));
        }
        Ok(grant)
    }

    async fn remove_authorization(&self, code: &str) -> Result<()> {
        sqlx::query("DELETE FROM token WHERE kind = 'authorize' AND code = ?")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn save_token_pair(&self, pair: &TokenPair) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;
        insert_pair(&mut tx, pair).await?;
        tx.commit().await.map_err(database_error)?;
        Ok(())
    }

    async fn load_access(&self, access_token: &str) -> Result<TokenPair> {
        let pair = self.fetch_pair("access_token", access_token).await?;
        Self::check_pair(pair, "access token")
    }

    async fn load_by_refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let pair = self.fetch_pair("refresh_token", refresh_token).await?;
        Self::check_pair(pair, "refresh token")
    }

    async fn remove_token_pair(&self, access_token: &str) -> Result<()> {
        sqlx::query("DELETE FROM token WHERE kind = 'access' AND access_token = ?")
            .bind(access_token)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn remove_by_refresh(&self, refresh_token: &str) -> Result<()> {
        sqlx::query("DELETE FROM token WHERE kind = 'access' AND refresh_token = ?")
            .bind(refresh_token)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn exchange_authorization(&self, code: &str, pair: &TokenPair) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let deleted = sqlx::query(
            "DELETE FROM token WHERE kind = 'authorize' AND code = ? AND expires_at > ?",
        )
        .bind(code)
        .bind(format_timestamp(&Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(database_error)?;

        // Dropping tx without commit rolls back.
        if deleted.rows_affected() != 1 {
            return Err(StorageError::NotFound("authorization code".to_string()));
        }

        insert_pair(&mut tx, pair).await?;
        tx.commit().await.map_err(database_error)?;
        Ok(())
    }

    async fn rotate_token_pair(&self, refresh_token: &str, pair: &TokenPair) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let deleted = sqlx::query(
            "DELETE FROM token WHERE kind = 'access' AND refresh_token = ? AND expires_at > ?",
        )
        .bind(refresh_token)
        .bind(format_timestamp(&Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(database_error)?;

        if deleted.rows_affected() != 1 {
            return Err(StorageError::NotFound("refresh token".to_string()));
        }

        insert_pair(&mut tx, pair).await?;
        tx.commit().await.map_err(database_error)?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM token WHERE expires_at <= ?")
            .bind(format_timestamp(&now))
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(result.rows_affected())
    }
}
