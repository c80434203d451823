//! OAuth 2.0 core types and data structures.
//!
//! Defines the stored records (clients, authorization grants, token pairs) and the
//! request/response shapes exchanged with the transport layer.

use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// OAuth 2.0 Grant Types accepted at the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl TryFrom<&str> for GrantType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(other.to_string()),
        }
    }
}

/// OAuth 2.0 Token Types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Bearer,
}

/// Discriminator of a row in the polymorphic token relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Authorization grant ("code") row
    Authorize,
    /// Access/refresh token pair row
    Access,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Authorize => "authorize",
            TokenKind::Access => "access",
        }
    }
}

impl TryFrom<&str> for TokenKind {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "authorize" => Ok(TokenKind::Authorize),
            "access" => Ok(TokenKind::Access),
            other => Err(format!("Unknown token kind: {}", other)),
        }
    }
}

/// Caller-defined metadata carried by clients, grants and token pairs.
///
/// The store persists the bytes as given and returns them unchanged. Callers that
/// want structure serialize it themselves; [`Metadata::from_json`] and
/// [`Metadata::to_json`] cover the common JSON case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(Vec<u8>);

impl Metadata {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Serialize a value as JSON bytes.
    pub fn from_json<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_vec(value).map(Self)
    }

    /// Deserialize the stored bytes as JSON.
    pub fn to_json<T: for<'de> Deserialize<'de>>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Metadata {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for Metadata {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<String> for Metadata {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<&str> for Metadata {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

/// Registered OAuth client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Unique client identifier, immutable once created
    pub id: String,
    /// Shared client secret
    pub secret: String,
    /// The single registered redirect URI
    pub redirect_uri: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            redirect_uri: redirect_uri.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Single-use authorization code record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub code: String,
    pub client_id: String,
    pub scope: String,
    /// Redirect URI presented at authorize time; must be re-presented at exchange
    pub redirect_uri: String,
    pub state: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    /// Absolute expiry, fixed at creation
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationGrant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Access token and its optional refresh token, created and destroyed together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    /// Absent for client credentials grants
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub scope: String,
    pub redirect_uri: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    /// Absolute expiry, fixed at creation
    pub expires_at: DateTime<Utc>,
}

impl TokenPair {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left before `expires_at`, negative once expired.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

/// Result of validating a bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerInfo {
    pub client_id: String,
    pub scope: String,
    /// Strictly positive
    pub remaining_ttl: Duration,
    pub created_at: DateTime<Utc>,
}

/// Client credentials presented at the token endpoint
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Authorization endpoint request
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
}

/// Token Exchange Request
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub grant_type: GrantType,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Token Response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: TokenType,
    /// Seconds until expiry
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

impl TokenResponse {
    /// Build the wire response for a freshly issued pair.
    pub fn from_pair(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access_token.clone(),
            token_type: TokenType::Bearer,
            expires_in: (pair.expires_at - pair.created_at).num_seconds().max(0) as u64,
            refresh_token: pair.refresh_token.clone(),
            scope: pair.scope.clone(),
        }
    }
}

/// Introspection response for a valid bearer token
#[derive(Debug, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub valid: bool,
    pub client_id: String,
    pub scope: String,
    pub expires_in: i64,
    pub create_time: String,
}

impl From<BearerInfo> for IntrospectionResponse {
    fn from(info: BearerInfo) -> Self {
        Self {
            valid: true,
            client_id: info.client_id,
            scope: info.scope,
            expires_in: info.remaining_ttl.num_seconds(),
            create_time: info.created_at.to_rfc3339(),
        }
    }
}

/// OAuth Error Response
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Generate a secure random token
pub fn generate_token() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.r#gen();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a client ID
pub fn generate_client_id() -> String {
    Uuid::new_v4().to_string()
}

/// Check that a redirect URI is an absolute URI without a fragment
pub fn is_valid_redirect_uri(uri: &str) -> bool {
    url::Url::parse(uri).is_ok_and(|url| url.fragment().is_none() && !url.cannot_be_a_base())
}

/// Validate scope string
pub fn validate_scope(scope: &str) -> bool {
    scope.split_whitespace().all(|s| {
        s.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.')
    })
}

/// Parse scope string into a set
pub fn parse_scope(scope: &str) -> HashSet<String> {
    scope.split_whitespace().map(|s| s.to_string()).collect()
}

/// Normalize a scope string: deduplicated, sorted, single-space separated.
pub fn normalize_scope(scope: &str) -> String {
    let mut scopes: Vec<_> = parse_scope(scope).into_iter().collect();
    scopes.sort();
    scopes.join(" ")
}
