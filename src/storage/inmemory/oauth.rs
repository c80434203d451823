//! In-memory OAuth storage implementation

use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    clients: HashMap<String, Client>,
    grants: HashMap<String, AuthorizationGrant>,
    pairs: HashMap<String, TokenPair>,
    // refresh_token -> access_token
    refresh_index: HashMap<String, String>,
}

impl State {
    fn insert_grant(&mut self, grant: &AuthorizationGrant) -> Result<()> {
        if !self.clients.contains_key(&grant.client_id) {
            return Err(StorageError::NotFound(format!("client {}", grant.client_id)));
        }
        if self.grants.contains_key(&grant.code) {
            return Err(StorageError::DuplicateCode);
        }
        self.grants.insert(grant.code.clone(), grant.clone());
        Ok(())
    }

    fn check_pair(&self, pair: &TokenPair) -> Result<()> {
        if !self.clients.contains_key(&pair.client_id) {
            return Err(StorageError::NotFound(format!("client {}", pair.client_id)));
        }
        if self.pairs.contains_key(&pair.access_token) {
            return Err(StorageError::AlreadyExists("access token".to_string()));
        }
        if let Some(refresh) = &pair.refresh_token {
            if self.refresh_index.contains_key(refresh) {
                return Err(StorageError::AlreadyExists("refresh token".to_string()));
            }
        }
        Ok(())
    }

    fn insert_pair(&mut self, pair: &TokenPair) {
        if let Some(refresh) = &pair.refresh_token {
            self.refresh_index
                .insert(refresh.clone(), pair.access_token.clone());
        }
        self.pairs.insert(pair.access_token.clone(), pair.clone());
    }

    fn delete_pair(&mut self, access_token: &str) -> Option<TokenPair> {
        let pair = self.pairs.remove(access_token)?;
        if let Some(refresh) = &pair.refresh_token {
            self.refresh_index.remove(refresh);
        }
        Some(pair)
    }

    fn pair_by_refresh(&self, refresh_token: &str) -> Option<&TokenPair> {
        self.refresh_index
            .get(refresh_token)
            .and_then(|access| self.pairs.get(access))
    }
}

/// In-memory implementation of [`OAuthStorage`]
#[derive(Default)]
pub struct MemoryOAuthStorage {
    state: Mutex<State>,
}

impl MemoryOAuthStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }
}

#[async_trait]
impl ClientStore for MemoryOAuthStorage {
    async fn create_client(&self, client: &Client) -> Result<()> {
        let mut state = self.lock()?;
        if state.clients.contains_key(&client.id) {
            return Err(StorageError::AlreadyExists(format!("client {}", client.id)));
        }
        state.clients.insert(client.id.clone(), client.clone());
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Client> {
        let state = self.lock()?;
        state
            .clients
            .get(client_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("client {}", client_id)))
    }

    async fn update_client(&self, client: &Client) -> Result<()> {
        let mut state = self.lock()?;
        match state.clients.get_mut(&client.id) {
            Some(existing) => {
                existing.secret = client.secret.clone();
                existing.redirect_uri = client.redirect_uri.clone();
                existing.metadata = client.metadata.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("client {}", client.id))),
        }
    }

    async fn remove_client(&self, client_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.clients.remove(client_id);
        state.grants.retain(|_, grant| grant.client_id != client_id);

        let owned: Vec<String> = state
            .pairs
            .values()
            .filter(|pair| pair.client_id == client_id)
            .map(|pair| pair.access_token.clone())
            .collect();
        for access_token in owned {
            state.delete_pair(&access_token);
        }
        Ok(())
    }

    async fn list_clients(&self, limit: Option<usize>) -> Result<Vec<Client>> {
        let state = self.lock()?;
        let mut result: Vec<_> = state.clients.values().cloned().collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }
}

#[async_trait]
impl TokenStore for MemoryOAuthStorage {
    async fn save_authorization(&self, grant: &AuthorizationGrant) -> Result<()> {
        self.lock()?.insert_grant(grant)
    }

    async fn load_authorization(&self, code: &str) -> Result<AuthorizationGrant> {
        let state = self.lock()?;
        let grant = state
            .grants
            .get(code)
            .ok_or_else(|| StorageError::NotFound("authorization code".to_string()))?;
        if grant.is_expired_at(Utc::now()) {
            return Err(StorageError::Expired("authorization code".to_string()));
        }
        Ok(grant.clone())
    }

    async fn remove_authorization(&self, code: &str) -> Result<()> {
        self.lock()?.grants.remove(code);
        Ok(())
    }

    async fn save_token_pair(&self, pair: &TokenPair) -> Result<()> {
        let mut state = self.lock()?;
        state.check_pair(pair)?;
        state.insert_pair(pair);
        Ok(())
    }

    async fn load_access(&self, access_token: &str) -> Result<TokenPair> {
        let state = self.lock()?;
        let pair = state
            .pairs
            .get(access_token)
            .ok_or_else(|| StorageError::NotFound("access token".to_string()))?;
        if pair.is_expired_at(Utc::now()) {
            return Err(StorageError::Expired("access token".to_string()));
        }
        Ok(pair.clone())
    }

    async fn load_by_refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let state = self.lock()?;
        let pair = state
            .pair_by_refresh(refresh_token)
            .ok_or_else(|| StorageError::NotFound("refresh token".to_string()))?;
        if pair.is_expired_at(Utc::now()) {
            return Err(StorageError::Expired("refresh token".to_string()));
        }
        Ok(pair.clone())
    }

    async fn remove_token_pair(&self, access_token: &str) -> Result<()> {
        self.lock()?.delete_pair(access_token);
        Ok(())
    }

    async fn remove_by_refresh(&self, refresh_token: &str) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(access_token) = state.refresh_index.get(refresh_token).cloned() {
            state.delete_pair(&access_token);
        }
        Ok(())
    }

    async fn exchange_authorization(&self, code: &str, pair: &TokenPair) -> Result<()> {
        let mut state = self.lock()?;
        let now = Utc::now();
        match state.grants.get(code) {
            Some(grant) if !grant.is_expired_at(now) => {}
            _ => return Err(StorageError::NotFound("authorization code".to_string())),
        }
        state.check_pair(pair)?;
        state.grants.remove(code);
        state.insert_pair(pair);
        Ok(())
    }

    async fn rotate_token_pair(&self, refresh_token: &str, pair: &TokenPair) -> Result<()> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let old_access = match state.pair_by_refresh(refresh_token) {
            Some(old) if !old.is_expired_at(now) => old.access_token.clone(),
            _ => return Err(StorageError::NotFound("refresh token".to_string())),
        };
        let old = state
            .delete_pair(&old_access)
            .ok_or_else(|| StorageError::NotFound("refresh token".to_string()))?;
        if let Err(err) = state.check_pair(pair) {
            state.insert_pair(&old);
            return Err(err);
        }
        state.insert_pair(pair);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock()?;
        let before = state.grants.len() + state.pairs.len();

        state.grants.retain(|_, grant| !grant.is_expired_at(now));
        let expired: Vec<String> = state
            .pairs
            .values()
            .filter(|pair| pair.is_expired_at(now))
            .map(|pair| pair.access_token.clone())
            .collect();
        for access_token in expired {
            state.delete_pair(&access_token);
        }

        Ok((before - state.grants.len() - state.pairs.len()) as u64)
    }
}

impl OAuthStorage for MemoryOAuthStorage {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn client() -> Client {
        Client::new("c1", "s1", "https://app/cb", Metadata::empty())
    }

    fn grant(code: &str, ttl: Duration) -> AuthorizationGrant {
        let now = Utc::now();
        AuthorizationGrant {
            code: code.to_string(),
            client_id: "c1".to_string(),
            scope: "read".to_string(),
            redirect_uri: "https://app/cb".to_string(),
            state: "xyz".to_string(),
            metadata: Metadata::empty(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    fn pair(access: &str, refresh: Option<&str>, ttl: Duration) -> TokenPair {
        let now = Utc::now();
        TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            client_id: "c1".to_string(),
            scope: "read".to_string(),
            redirect_uri: "https://app/cb".to_string(),
            metadata: Metadata::empty(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    async fn storage() -> MemoryOAuthStorage {
        let storage = MemoryOAuthStorage::new();
        storage.create_client(&client()).await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_client_crud() {
        let storage = storage().await;

        assert!(matches!(
            storage.create_client(&client()).await,
            Err(StorageError::AlreadyExists(_))
        ));

        let mut updated = client();
        updated.secret = "s2".to_string();
        updated.metadata = Metadata::from("tier=gold");
        storage.update_client(&updated).await.unwrap();

        let loaded = storage.get_client("c1").await.unwrap();
        assert_eq!(loaded.secret, "s2");
        assert_eq!(loaded.metadata.as_bytes(), b"tier=gold");

        let missing = Client::new("c2", "s", "https://other/cb", Metadata::empty());
        assert!(matches!(
            storage.update_client(&missing).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_authorization_lifecycle() {
        let storage = storage().await;

        storage
            .save_authorization(&grant("g1", Duration::minutes(10)))
            .await
            .unwrap();
        assert!(matches!(
            storage
                .save_authorization(&grant("g1", Duration::minutes(10)))
                .await,
            Err(StorageError::DuplicateCode)
        ));

        storage.load_authorization("g1").await.unwrap();
        storage.remove_authorization("g1").await.unwrap();
        storage.remove_authorization("g1").await.unwrap();
        assert!(matches!(
            storage.load_authorization("g1").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_records_report_expired() {
        let storage = storage().await;

        storage
            .save_authorization(&grant("old", Duration::seconds(-1)))
            .await
            .unwrap();
        storage
            .save_token_pair(&pair("a-old", Some("r-old"), Duration::seconds(-1)))
            .await
            .unwrap();

        assert!(matches!(
            storage.load_authorization("old").await,
            Err(StorageError::Expired(_))
        ));
        assert!(matches!(
            storage.load_access("a-old").await,
            Err(StorageError::Expired(_))
        ));
        assert!(matches!(
            storage.load_by_refresh("r-old").await,
            Err(StorageError::Expired(_))
        ));
        assert!(matches!(
            storage
                .exchange_authorization("old", &pair("a1", Some("r1"), Duration::hours(1)))
                .await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rotation_replaces_pair() {
        let storage = storage().await;
        storage
            .save_token_pair(&pair("a1", Some("r1"), Duration::hours(1)))
            .await
            .unwrap();

        storage
            .rotate_token_pair("r1", &pair("a2", Some("r2"), Duration::hours(1)))
            .await
            .unwrap();

        assert!(storage.load_access("a1").await.is_err());
        assert!(storage.load_by_refresh("r1").await.is_err());
        assert_eq!(storage.load_by_refresh("r2").await.unwrap().access_token, "a2");

        assert!(matches!(
            storage
                .rotate_token_pair("r1", &pair("a3", Some("r3"), Duration::hours(1)))
                .await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_rotation_keeps_old_pair() {
        let storage = storage().await;
        storage
            .save_token_pair(&pair("a1", Some("r1"), Duration::hours(1)))
            .await
            .unwrap();
        storage
            .save_token_pair(&pair("taken", None, Duration::hours(1)))
            .await
            .unwrap();

        assert!(
            storage
                .rotate_token_pair("r1", &pair("taken", Some("r2"), Duration::hours(1)))
                .await
                .is_err()
        );
        assert!(storage.load_access("a1").await.is_ok());
        assert!(storage.load_by_refresh("r1").await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_client_cascades() {
        let storage = storage().await;
        storage
            .save_authorization(&grant("g1", Duration::minutes(10)))
            .await
            .unwrap();
        storage
            .save_token_pair(&pair("a1", Some("r1"), Duration::hours(1)))
            .await
            .unwrap();

        storage.remove_client("c1").await.unwrap();

        assert!(storage.get_client("c1").await.is_err());
        assert!(storage.load_authorization("g1").await.is_err());
        assert!(storage.load_access("a1").await.is_err());
        assert!(storage.load_by_refresh("r1").await.is_err());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let storage = storage().await;
        storage
            .save_authorization(&grant("old", Duration::seconds(-5)))
            .await
            .unwrap();
        storage
            .save_authorization(&grant("new", Duration::minutes(10)))
            .await
            .unwrap();
        storage
            .save_token_pair(&pair("a-old", Some("r-old"), Duration::seconds(-5)))
            .await
            .unwrap();

        assert_eq!(storage.purge_expired(Utc::now()).await.unwrap(), 2);
        assert!(storage.load_authorization("new").await.is_ok());
        assert!(matches!(
            storage.load_by_refresh("r-old").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
