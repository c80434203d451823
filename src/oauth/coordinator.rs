//! Grant coordinator driving the code, token and refresh state transitions.
//!
//! ```text
//!         issue code               exchange code             refresh
//!  [none] ---------> [grant:issued] ----------> [pair:issued] --------> [pair:issued']
//! ```
//!
//! Every transition that consumes a credential goes through one of the store's
//! compound operations, so a code or refresh token is used at most once even when
//! requests race. Storage outcomes that say "not usable" (absent, expired, bound to
//! another client or redirect) collapse into `InvalidGrant` / `InvalidToken` here,
//! after the specific reason has been logged at debug level.

use crate::config::Config;
use crate::errors::{GrantError, StorageError};
use crate::oauth::types::*;
use crate::storage::traits::OAuthStorage;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;

/// Default authorization code lifetime
pub const DEFAULT_CODE_LIFETIME_SECS: i64 = 600;

/// Default access/refresh pair lifetime
pub const DEFAULT_ACCESS_LIFETIME_SECS: i64 = 3600;

/// Default bound on a single storage call
pub const DEFAULT_STORAGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Authorization request that could not be granted.
///
/// `redirect_uri` is only set once the client and redirect have been verified;
/// without it the error must be rendered to the caller directly.
#[derive(Debug)]
pub struct AuthorizeRejection {
    pub error: GrantError,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
}

/// Coordinates grants over the client registry and token store
pub struct GrantCoordinator {
    storage: Arc<dyn OAuthStorage>,
    code_lifetime: Duration,
    access_lifetime: Duration,
    storage_timeout: std::time::Duration,
}

impl GrantCoordinator {
    /// Create a coordinator with default lifetimes
    pub fn new(storage: Arc<dyn OAuthStorage>) -> Self {
        Self {
            storage,
            code_lifetime: Duration::seconds(DEFAULT_CODE_LIFETIME_SECS),
            access_lifetime: Duration::seconds(DEFAULT_ACCESS_LIFETIME_SECS),
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    /// Create a coordinator using the configured lifetimes and storage timeout
    pub fn from_config(storage: Arc<dyn OAuthStorage>, config: &Config) -> Self {
        Self::new(storage)
            .with_lifetimes(
                *config.authorization_code_expiration.as_ref(),
                *config.access_token_expiration.as_ref(),
            )
            .with_storage_timeout(*config.storage_timeout.as_ref())
    }

    pub fn with_lifetimes(mut self, code_lifetime: Duration, access_lifetime: Duration) -> Self {
        self.code_lifetime = code_lifetime;
        self.access_lifetime = access_lifetime;
        self
    }

    pub fn with_storage_timeout(mut self, storage_timeout: std::time::Duration) -> Self {
        self.storage_timeout = storage_timeout;
        self
    }

    pub fn storage(&self) -> &Arc<dyn OAuthStorage> {
        &self.storage
    }

    /// Run a storage call under the configured time bound.
    pub async fn bounded<T, F>(&self, call: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        tokio::time::timeout(self.storage_timeout, call)
            .await
            .map_err(|_| StorageError::Timeout(self.storage_timeout))?
    }

    async fn client(&self, client_id: &str) -> Result<Option<Client>, GrantError> {
        match self.bounded(self.storage.get_client(client_id)).await {
            Ok(client) => Ok(Some(client)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn new_pair(
        &self,
        client_id: &str,
        scope: &str,
        redirect_uri: &str,
        metadata: Metadata,
        with_refresh: bool,
    ) -> TokenPair {
        let now = Utc::now();
        TokenPair {
            access_token: generate_token(),
            refresh_token: with_refresh.then(generate_token),
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            redirect_uri: redirect_uri.to_string(),
            metadata,
            created_at: now,
            expires_at: now + self.access_lifetime,
        }
    }

    /// Verify a client and resolve the redirect URI an authorization result goes to.
    ///
    /// An empty `redirect_uri` resolves to the registered one; anything else must
    /// match it exactly.
    pub async fn resolve_redirect(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<String, GrantError> {
        let client = self
            .client(client_id)
            .await?
            .ok_or_else(|| GrantError::UnknownClient(client_id.to_string()))?;

        if redirect_uri.is_empty() {
            return Ok(client.redirect_uri);
        }
        if redirect_uri != client.redirect_uri {
            tracing::debug!(client_id = %client_id, "redirect_uri does not match registration");
            return Err(GrantError::RedirectMismatch);
        }
        Ok(client.redirect_uri)
    }

    /// Issue a single-use authorization code
    pub async fn begin_authorization(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
        state: &str,
    ) -> Result<AuthorizationGrant, GrantError> {
        self.begin_authorization_with_metadata(
            client_id,
            redirect_uri,
            scope,
            state,
            Metadata::empty(),
        )
        .await
    }

    /// Issue a single-use authorization code carrying caller metadata.
    ///
    /// The metadata is copied onto every token pair derived from the code.
    pub async fn begin_authorization_with_metadata(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
        state: &str,
        metadata: Metadata,
    ) -> Result<AuthorizationGrant, GrantError> {
        let redirect_uri = self.resolve_redirect(client_id, redirect_uri).await?;

        if !validate_scope(scope) {
            return Err(GrantError::InvalidRequest("malformed scope".to_string()));
        }

        let now = Utc::now();
        let grant = AuthorizationGrant {
            code: generate_token(),
            client_id: client_id.to_string(),
            scope: normalize_scope(scope),
            redirect_uri,
            state: state.to_string(),
            metadata,
            created_at: now,
            expires_at: now + self.code_lifetime,
        };

        self.bounded(self.storage.save_authorization(&grant))
            .await?;

        tracing::info!(client_id = %client_id, "authorization code issued");
        Ok(grant)
    }

    /// Handle an authorization endpoint request.
    pub async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<AuthorizationGrant, AuthorizeRejection> {
        let state = request.state.unwrap_or_default();
        let reject = |error: GrantError, redirect_uri: Option<String>| AuthorizeRejection {
            error,
            redirect_uri,
            state: (!state.is_empty()).then(|| state.clone()),
        };

        let client_id = match request.client_id.as_deref() {
            Some(client_id) if !client_id.is_empty() => client_id,
            _ => {
                return Err(reject(
                    GrantError::InvalidRequest("missing client_id".to_string()),
                    None,
                ));
            }
        };
        let redirect_uri = request.redirect_uri.unwrap_or_default();

        let trusted = self
            .resolve_redirect(client_id, &redirect_uri)
            .await
            .map_err(|err| reject(err, None))?;

        match request.response_type.as_deref() {
            Some("code") => {}
            Some(other) => {
                return Err(reject(
                    GrantError::UnsupportedResponseType(other.to_string()),
                    Some(trusted),
                ));
            }
            None => {
                return Err(reject(
                    GrantError::InvalidRequest("missing response_type".to_string()),
                    Some(trusted),
                ));
            }
        }

        let scope = request.scope.unwrap_or_default();
        self.begin_authorization(client_id, &trusted, &scope, &state)
            .await
            .map_err(|err| reject(err, Some(trusted.clone())))
    }

    /// Exchange an authorization code for a token pair
    pub async fn exchange_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<TokenPair, GrantError> {
        let grant = match self.bounded(self.storage.load_authorization(code)).await {
            Ok(grant) => grant,
            Err(err) if err.is_invalid_record() => {
                tracing::debug!(client_id = %client_id, error = %err, "authorization code rejected");
                return Err(GrantError::InvalidGrant(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        if grant.client_id != client_id {
            tracing::debug!(client_id = %client_id, "authorization code bound to another client");
            return Err(GrantError::InvalidGrant("client mismatch".to_string()));
        }
        if grant.redirect_uri != redirect_uri {
            tracing::debug!(client_id = %client_id, "authorization code bound to another redirect_uri");
            return Err(GrantError::InvalidGrant("redirect_uri mismatch".to_string()));
        }

        let pair = self.new_pair(
            &grant.client_id,
            &grant.scope,
            &grant.redirect_uri,
            grant.metadata,
            true,
        );

        match self
            .bounded(self.storage.exchange_authorization(code, &pair))
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_invalid_record() => {
                tracing::debug!(client_id = %client_id, "authorization code consumed concurrently");
                return Err(GrantError::InvalidGrant(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(client_id = %client_id, "authorization code exchanged");
        Ok(pair)
    }

    /// Rotate a token pair using its refresh token
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, GrantError> {
        self.rotate(refresh_token, None).await
    }

    async fn rotate(
        &self,
        refresh_token: &str,
        expected_client: Option<&str>,
    ) -> Result<TokenPair, GrantError> {
        let old = match self.bounded(self.storage.load_by_refresh(refresh_token)).await {
            Ok(old) => old,
            Err(err) if err.is_invalid_record() => {
                tracing::debug!(error = %err, "refresh token rejected");
                return Err(GrantError::InvalidGrant(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(expected) = expected_client {
            if expected != old.client_id {
                tracing::debug!(client_id = %expected, "refresh token bound to another client");
                return Err(GrantError::InvalidGrant("client mismatch".to_string()));
            }
        }

        let pair = self.new_pair(
            &old.client_id,
            &old.scope,
            &old.redirect_uri,
            old.metadata,
            true,
        );

        match self
            .bounded(self.storage.rotate_token_pair(refresh_token, &pair))
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_invalid_record() => {
                tracing::debug!(client_id = %old.client_id, "refresh token consumed concurrently");
                return Err(GrantError::InvalidGrant(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(client_id = %old.client_id, "token pair rotated");
        Ok(pair)
    }

    /// Revoke the pair owning an access token. Unknown tokens are ignored.
    pub async fn revoke_access(&self, access_token: &str) -> Result<(), GrantError> {
        self.bounded(self.storage.remove_token_pair(access_token))
            .await?;
        tracing::info!("token pair revoked by access token");
        Ok(())
    }

    /// Revoke the pair owning a refresh token. Unknown tokens are ignored.
    pub async fn revoke_refresh(&self, refresh_token: &str) -> Result<(), GrantError> {
        self.bounded(self.storage.remove_by_refresh(refresh_token))
            .await?;
        tracing::info!("token pair revoked by refresh token");
        Ok(())
    }

    /// Validate a bearer access token
    pub async fn validate_bearer(&self, access_token: &str) -> Result<BearerInfo, GrantError> {
        let pair = match self.bounded(self.storage.load_access(access_token)).await {
            Ok(pair) => pair,
            Err(err) if err.is_invalid_record() => {
                tracing::debug!(error = %err, "bearer token rejected");
                return Err(GrantError::InvalidToken(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        // Introspection reports whole seconds, so a sub-second remainder is already expired.
        let remaining_ttl = pair.remaining_ttl(Utc::now());
        if remaining_ttl.num_seconds() <= 0 {
            return Err(GrantError::InvalidToken("expired".to_string()));
        }

        Ok(BearerInfo {
            client_id: pair.client_id,
            scope: pair.scope,
            remaining_ttl,
            created_at: pair.created_at,
        })
    }

    /// Authenticate a client by id and shared secret
    pub async fn authenticate_client(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<Client, GrantError> {
        let client = self
            .client(&credentials.client_id)
            .await?
            .ok_or_else(|| GrantError::InvalidClient("unknown client".to_string()))?;

        let provided = credentials
            .client_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| GrantError::InvalidClient("missing client secret".to_string()))?;

        if client.secret.is_empty() || !secrets_match(provided, &client.secret) {
            tracing::debug!(client_id = %client.id, "client secret mismatch");
            return Err(GrantError::InvalidClient("invalid client secret".to_string()));
        }

        Ok(client)
    }

    /// Issue an access token with no refresh token to an authenticated client
    pub async fn issue_client_credentials(
        &self,
        client: &Client,
        scope: &str,
    ) -> Result<TokenPair, GrantError> {
        if client.secret.is_empty() {
            return Err(GrantError::UnauthorizedClient(client.id.clone()));
        }
        if !validate_scope(scope) {
            return Err(GrantError::InvalidRequest("malformed scope".to_string()));
        }

        let pair = self.new_pair(
            &client.id,
            &normalize_scope(scope),
            &client.redirect_uri,
            client.metadata.clone(),
            false,
        );
        self.bounded(self.storage.save_token_pair(&pair)).await?;

        tracing::info!(client_id = %client.id, "client credentials token issued");
        Ok(pair)
    }

    /// Handle a token endpoint request
    pub async fn token(
        &self,
        request: TokenRequest,
        credentials: Option<ClientCredentials>,
    ) -> Result<TokenResponse, GrantError> {
        let pair = match request.grant_type {
            GrantType::AuthorizationCode => {
                let credentials = credentials.ok_or_else(|| {
                    GrantError::InvalidClient("missing client credentials".to_string())
                })?;
                let client = self.authenticate_client(&credentials).await?;

                let code = request
                    .code
                    .filter(|code| !code.is_empty())
                    .ok_or_else(|| GrantError::InvalidRequest("missing code".to_string()))?;
                let redirect_uri = request
                    .redirect_uri
                    .filter(|uri| !uri.is_empty())
                    .unwrap_or_else(|| client.redirect_uri.clone());

                self.exchange_code(&code, &client.id, &redirect_uri).await?
            }
            GrantType::ClientCredentials => {
                let credentials = credentials.ok_or_else(|| {
                    GrantError::InvalidClient("missing client credentials".to_string())
                })?;
                let client = self.authenticate_client(&credentials).await?;
                let scope = request.scope.unwrap_or_default();

                self.issue_client_credentials(&client, &scope).await?
            }
            GrantType::RefreshToken => {
                let refresh_token = request
                    .refresh_token
                    .filter(|token| !token.is_empty())
                    .ok_or_else(|| {
                        GrantError::InvalidRequest("missing refresh_token".to_string())
                    })?;

                match credentials {
                    Some(credentials) => {
                        let client = self.authenticate_client(&credentials).await?;
                        self.rotate(&refresh_token, Some(&client.id)).await?
                    }
                    None => self.rotate(&refresh_token, None).await?,
                }
            }
        };

        Ok(TokenResponse::from_pair(&pair))
    }

    /// Delete expired grants and pairs, returning how many rows were removed
    pub async fn purge_expired(&self) -> Result<u64, GrantError> {
        let purged = self
            .bounded(self.storage.purge_expired(Utc::now()))
            .await?;
        if purged > 0 {
            tracing::debug!(purged, "expired tokens purged");
        }
        Ok(purged)
    }
}

fn secrets_match(provided: &str, expected: &str) -> bool {
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryOAuthStorage;
    use crate::storage::traits::{ClientStore, Result as StorageResult, TokenStore};
    use async_trait::async_trait;
    use chrono::DateTime;
    use http::StatusCode;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory storage whose compound exchange can be made to hang.
    #[derive(Default)]
    struct StallingStorage {
        inner: MemoryOAuthStorage,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl ClientStore for StallingStorage {
        async fn create_client(&self, client: &Client) -> StorageResult<()> {
            self.inner.create_client(client).await
        }

        async fn get_client(&self, client_id: &str) -> StorageResult<Client> {
            self.inner.get_client(client_id).await
        }

        async fn update_client(&self, client: &Client) -> StorageResult<()> {
            self.inner.update_client(client).await
        }

        async fn remove_client(&self, client_id: &str) -> StorageResult<()> {
            self.inner.remove_client(client_id).await
        }

        async fn list_clients(&self, limit: Option<usize>) -> StorageResult<Vec<Client>> {
            self.inner.list_clients(limit).await
        }
    }

    #[async_trait]
    impl TokenStore for StallingStorage {
        async fn save_authorization(&self, grant: &AuthorizationGrant) -> StorageResult<()> {
            self.inner.save_authorization(grant).await
        }

        async fn load_authorization(&self, code: &str) -> StorageResult<AuthorizationGrant> {
            self.inner.load_authorization(code).await
        }

        async fn remove_authorization(&self, code: &str) -> StorageResult<()> {
            self.inner.remove_authorization(code).await
        }

        async fn save_token_pair(&self, pair: &TokenPair) -> StorageResult<()> {
            self.inner.save_token_pair(pair).await
        }

        async fn load_access(&self, access_token: &str) -> StorageResult<TokenPair> {
            self.inner.load_access(access_token).await
        }

        async fn load_by_refresh(&self, refresh_token: &str) -> StorageResult<TokenPair> {
            self.inner.load_by_refresh(refresh_token).await
        }

        async fn remove_token_pair(&self, access_token: &str) -> StorageResult<()> {
            self.inner.remove_token_pair(access_token).await
        }

        async fn remove_by_refresh(&self, refresh_token: &str) -> StorageResult<()> {
            self.inner.remove_by_refresh(refresh_token).await
        }

        async fn exchange_authorization(
            &self,
            code: &str,
            pair: &TokenPair,
        ) -> StorageResult<()> {
            if self.stalled.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            }
            self.inner.exchange_authorization(code, pair).await
        }

        async fn rotate_token_pair(
            &self,
            refresh_token: &str,
            pair: &TokenPair,
        ) -> StorageResult<()> {
            self.inner.rotate_token_pair(refresh_token, pair).await
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
            self.inner.purge_expired(now).await
        }
    }

    impl OAuthStorage for StallingStorage {}

    async fn coordinator() -> GrantCoordinator {
        let storage = Arc::new(MemoryOAuthStorage::new());
        storage
            .create_client(&Client::new("c1", "s1", "https://app/cb", Metadata::empty()))
            .await
            .unwrap();
        GrantCoordinator::new(storage)
    }

    fn credentials(secret: &str) -> Option<ClientCredentials> {
        Some(ClientCredentials {
            client_id: "c1".to_string(),
            client_secret: Some(secret.to_string()),
        })
    }

    #[tokio::test]
    async fn test_begin_authorization_defaults_redirect() {
        let coordinator = coordinator().await;
        let grant = coordinator
            .begin_authorization("c1", "", "read", "xyz")
            .await
            .unwrap();
        assert_eq!(grant.redirect_uri, "https://app/cb");
        assert_eq!(grant.expires_at - grant.created_at, Duration::seconds(600));
    }

    #[tokio::test]
    async fn test_begin_authorization_rejections() {
        let coordinator = coordinator().await;
        assert!(matches!(
            coordinator
                .begin_authorization("nobody", "https://app/cb", "read", "")
                .await,
            Err(GrantError::UnknownClient(_))
        ));
        assert!(matches!(
            coordinator
                .begin_authorization("c1", "https://evil/cb", "read", "")
                .await,
            Err(GrantError::RedirectMismatch)
        ));
    }

    #[tokio::test]
    async fn test_authorize_rejection_trust() {
        let coordinator = coordinator().await;

        let untrusted = coordinator
            .authorize(AuthorizationRequest {
                response_type: Some("code".to_string()),
                client_id: Some("c1".to_string()),
                redirect_uri: Some("https://evil/cb".to_string()),
                scope: None,
                state: Some("xyz".to_string()),
            })
            .await
            .unwrap_err();
        assert!(untrusted.redirect_uri.is_none());

        let trusted = coordinator
            .authorize(AuthorizationRequest {
                response_type: Some("token".to_string()),
                client_id: Some("c1".to_string()),
                redirect_uri: Some("https://app/cb".to_string()),
                scope: None,
                state: Some("xyz".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(trusted.redirect_uri.as_deref(), Some("https://app/cb"));
        assert_eq!(trusted.state.as_deref(), Some("xyz"));
        assert_eq!(trusted.error.error_code(), "unsupported_response_type");
    }

    #[tokio::test]
    async fn test_token_requires_client_authentication() {
        let coordinator = coordinator().await;
        let grant = coordinator
            .begin_authorization("c1", "https://app/cb", "read", "")
            .await
            .unwrap();
        let request = TokenRequest {
            grant_type: GrantType::AuthorizationCode,
            code: Some(grant.code.clone()),
            redirect_uri: Some("https://app/cb".to_string()),
            refresh_token: None,
            scope: None,
        };

        let err = coordinator
            .token(request.clone(), credentials("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidClient(_)));

        let err = coordinator.token(request.clone(), None).await.unwrap_err();
        assert!(matches!(err, GrantError::InvalidClient(_)));

        // The failed attempts did not consume the code
        let response = coordinator
            .token(request, credentials("s1"))
            .await
            .unwrap();
        assert_eq!(response.expires_in, 3600);
        assert!(response.refresh_token.is_some());
        assert_eq!(response.scope, "read");
    }

    #[tokio::test]
    async fn test_client_credentials_has_no_refresh_token() {
        let coordinator = coordinator().await;
        let response = coordinator
            .token(
                TokenRequest {
                    grant_type: GrantType::ClientCredentials,
                    code: None,
                    redirect_uri: None,
                    refresh_token: None,
                    scope: Some("write read".to_string()),
                },
                credentials("s1"),
            )
            .await
            .unwrap();

        assert!(response.refresh_token.is_none());
        assert_eq!(response.scope, "read write");

        let info = coordinator
            .validate_bearer(&response.access_token)
            .await
            .unwrap();
        assert_eq!(info.client_id, "c1");
    }

    #[tokio::test]
    async fn test_refresh_with_foreign_client_is_rejected() {
        let coordinator = coordinator().await;
        coordinator
            .storage()
            .create_client(&Client::new("c2", "s2", "https://other/cb", Metadata::empty()))
            .await
            .unwrap();

        let grant = coordinator
            .begin_authorization("c1", "https://app/cb", "read", "")
            .await
            .unwrap();
        let pair = coordinator
            .exchange_code(&grant.code, "c1", "https://app/cb")
            .await
            .unwrap();
        let refresh_token = pair.refresh_token.clone().unwrap();

        let err = coordinator
            .token(
                TokenRequest {
                    grant_type: GrantType::RefreshToken,
                    code: None,
                    redirect_uri: None,
                    refresh_token: Some(refresh_token.clone()),
                    scope: None,
                },
                Some(ClientCredentials {
                    client_id: "c2".to_string(),
                    client_secret: Some("s2".to_string()),
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidGrant(_)));

        // Still usable by its owner
        assert!(coordinator.refresh_tokens(&refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_bearer_is_invalid() {
        let coordinator = coordinator().await;
        let now = Utc::now();
        coordinator
            .storage()
            .save_token_pair(&TokenPair {
                access_token: "stale".to_string(),
                refresh_token: None,
                client_id: "c1".to_string(),
                scope: "read".to_string(),
                redirect_uri: "https://app/cb".to_string(),
                metadata: Metadata::empty(),
                created_at: now - Duration::hours(2),
                expires_at: now - Duration::seconds(1),
            })
            .await
            .unwrap();

        assert!(matches!(
            coordinator.validate_bearer("stale").await,
            Err(GrantError::InvalidToken(_))
        ));
        assert!(matches!(
            coordinator.validate_bearer("never-issued").await,
            Err(GrantError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_storage_timeout_leaves_code_usable() {
        let storage = Arc::new(StallingStorage::default());
        storage
            .create_client(&Client::new("c1", "s1", "https://app/cb", Metadata::empty()))
            .await
            .unwrap();
        let coordinator = GrantCoordinator::new(storage.clone())
            .with_storage_timeout(std::time::Duration::from_millis(10));

        let grant = coordinator
            .begin_authorization("c1", "https://app/cb", "read", "")
            .await
            .unwrap();

        storage.stalled.store(true, Ordering::SeqCst);
        let err = coordinator
            .exchange_code(&grant.code, "c1", "https://app/cb")
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::Storage(StorageError::Timeout(_))));
        assert_eq!(err.error_code(), "server_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        // The abandoned exchange consumed nothing.
        storage.stalled.store(false, Ordering::SeqCst);
        let pair = coordinator
            .exchange_code(&grant.code, "c1", "https://app/cb")
            .await
            .unwrap();
        assert!(coordinator.validate_bearer(&pair.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_bearer_with_sub_second_remainder_is_invalid() {
        let coordinator = coordinator().await;
        let now = Utc::now();
        coordinator
            .storage()
            .save_token_pair(&TokenPair {
                access_token: "fading".to_string(),
                refresh_token: None,
                client_id: "c1".to_string(),
                scope: "read".to_string(),
                redirect_uri: "https://app/cb".to_string(),
                metadata: Metadata::empty(),
                created_at: now - Duration::hours(1),
                expires_at: now + Duration::milliseconds(500),
            })
            .await
            .unwrap();

        assert!(matches!(
            coordinator.validate_bearer("fading").await,
            Err(GrantError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("s1", "s1"));
        assert!(!secrets_match("s1", "s2"));
    }
}
