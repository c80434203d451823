//! Standardized error types following the `error-grantkeep-<domain>-<number>` format.

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use thiserror::Error;

use crate::oauth::types::OAuthErrorResponse;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-grantkeep-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when PORT cannot be parsed
    #[error("error-grantkeep-config-2 Parsing PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-grantkeep-config-3 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when duration string cannot be parsed
    #[error("error-grantkeep-config-4 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when boolean string cannot be parsed
    #[error(
        "error-grantkeep-config-5 Failed to parse boolean '{0}': expected true/false/1/0/yes/no/on/off"
    )]
    BoolParsingFailed(String),

    /// Error when an integer setting cannot be parsed
    #[error("error-grantkeep-config-6 Failed to parse '{0}' as a number: {1}")]
    NumberParsingFailed(String, std::num::ParseIntError),

    /// Error when an allowed origin is not a valid header value
    #[error("error-grantkeep-config-7 Invalid allowed origin '{0}'")]
    InvalidOrigin(String),

    /// Error when the storage backend name or its settings are invalid
    #[error("error-grantkeep-config-8 Invalid storage backend: {0}")]
    InvalidStorageBackend(String),

    /// Error when the schema cannot be created or verified
    #[error("error-grantkeep-config-9 Schema setup failed: {0}")]
    SchemaSetupFailed(String),
}

/// Database/storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Requested record does not exist
    #[error("error-grantkeep-storage-1 Not found: {0}")]
    NotFound(String),

    /// Record exists but its stored expiry is in the past
    #[error("error-grantkeep-storage-2 Expired: {0}")]
    Expired(String),

    /// Authorization code already stored
    #[error("error-grantkeep-storage-3 Duplicate authorization code")]
    DuplicateCode,

    /// Record with the same unique key already stored
    #[error("error-grantkeep-storage-4 Already exists: {0}")]
    AlreadyExists(String),

    /// Error when database connection fails
    #[error("error-grantkeep-storage-5 Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Error when database operation or transaction fails
    #[error("error-grantkeep-storage-6 Database error: {0}")]
    DatabaseError(String),

    /// Error when stored data does not match the expected shape
    #[error("error-grantkeep-storage-7 Invalid data: {0}")]
    InvalidData(String),

    /// Storage call exceeded its time bound
    #[error("error-grantkeep-storage-8 Storage operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl StorageError {
    /// True for the "record is absent or no longer valid" kinds.
    pub fn is_invalid_record(&self) -> bool {
        matches!(self, StorageError::NotFound(_) | StorageError::Expired(_))
    }
}

/// Grant coordinator errors.
///
/// The first four variants are internal classifications. Before a response is
/// rendered they collapse into the wire-level `invalid_grant` / `invalid_token`
/// codes so callers cannot tell "expired" from "never existed".
#[derive(Debug, Error)]
pub enum GrantError {
    /// Client id is not registered
    #[error("error-grantkeep-grant-1 Unknown client: {0}")]
    UnknownClient(String),

    /// Redirect URI does not match the registered one
    #[error("error-grantkeep-grant-2 Redirect URI mismatch")]
    RedirectMismatch,

    /// Authorization code or refresh token is invalid, expired, or bound elsewhere
    #[error("error-grantkeep-grant-3 Invalid grant: {0}")]
    InvalidGrant(String),

    /// Bearer token is invalid or expired
    #[error("error-grantkeep-grant-4 Invalid token: {0}")]
    InvalidToken(String),

    /// Client authentication failed
    #[error("error-grantkeep-grant-5 Invalid client credentials: {0}")]
    InvalidClient(String),

    /// Client may not use the requested grant
    #[error("error-grantkeep-grant-6 Unauthorized client: {0}")]
    UnauthorizedClient(String),

    /// Malformed or incomplete request
    #[error("error-grantkeep-grant-7 Invalid request: {0}")]
    InvalidRequest(String),

    /// grant_type is not supported
    #[error("error-grantkeep-grant-8 Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// response_type is not supported
    #[error("error-grantkeep-grant-9 Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    /// Storage failure, surfaced as server_error
    #[error("error-grantkeep-grant-10 Server error: {0}")]
    Storage(#[from] StorageError),
}

impl GrantError {
    /// OAuth 2.0 error code for the wire.
    pub fn error_code(&self) -> &'static str {
        match self {
            GrantError::UnknownClient(_) => "unauthorized_client",
            GrantError::RedirectMismatch => "invalid_request",
            GrantError::InvalidGrant(_) => "invalid_grant",
            GrantError::InvalidToken(_) => "invalid_token",
            GrantError::InvalidClient(_) => "invalid_client",
            GrantError::UnauthorizedClient(_) => "unauthorized_client",
            GrantError::InvalidRequest(_) => "invalid_request",
            GrantError::UnsupportedGrantType(_) => "unsupported_grant_type",
            GrantError::UnsupportedResponseType(_) => "unsupported_response_type",
            GrantError::Storage(_) => "server_error",
        }
    }

    /// HTTP status used when the error is rendered as a JSON body.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GrantError::InvalidClient(_) | GrantError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            GrantError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Human readable description safe to return to callers.
    pub fn description(&self) -> &'static str {
        match self {
            GrantError::UnknownClient(_) => "client is not registered",
            GrantError::RedirectMismatch => "redirect_uri does not match the registered value",
            GrantError::InvalidGrant(_) => "authorization grant is invalid or expired",
            GrantError::InvalidToken(_) => "access token is invalid or expired",
            GrantError::InvalidClient(_) => "client authentication failed",
            GrantError::UnauthorizedClient(_) => "client is not authorized for this grant",
            GrantError::InvalidRequest(_) => "request is missing a parameter or malformed",
            GrantError::UnsupportedGrantType(_) => "grant_type is not supported",
            GrantError::UnsupportedResponseType(_) => "response_type is not supported",
            GrantError::Storage(_) => "internal server error",
        }
    }
}

impl IntoResponse for GrantError {
    fn into_response(self) -> Response {
        if let GrantError::Storage(ref err) = self {
            tracing::error!(error = ?err, "storage failure");
        }

        let body = OAuthErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.description().to_string()),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
