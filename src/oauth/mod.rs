//! OAuth 2.0 grant coordination on top of the client registry and token store.

pub mod coordinator;
pub mod types;

// Re-export frequently used items from each module
pub use crate::storage::{
    inmemory::MemoryOAuthStorage,
    traits::{ClientStore, OAuthStorage, TokenStore},
};
pub use coordinator::{AuthorizeRejection, GrantCoordinator};
pub use types::{
    AuthorizationGrant, AuthorizationRequest, BearerInfo, Client, ClientCredentials, GrantType,
    IntrospectionResponse, Metadata, OAuthErrorResponse, TokenPair, TokenRequest, TokenResponse,
    TokenType, parse_scope,
};
