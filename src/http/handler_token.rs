//! Handles /oauth/token - Exchanges codes, client credentials and refresh tokens for token pairs

use axum::{
    Form, Json,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use base64::prelude::*;
use serde::Deserialize;

use super::context::AppState;
use crate::errors::GrantError;
use crate::oauth::types::{ClientCredentials, GrantType, TokenRequest};

/// Form data for token endpoint
#[derive(Debug, Default, Deserialize)]
pub struct TokenForm {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

impl TryFrom<&TokenForm> for TokenRequest {
    type Error = GrantError;

    fn try_from(form: &TokenForm) -> Result<Self, Self::Error> {
        let grant_type = match form.grant_type.as_deref() {
            None | Some("") => {
                return Err(GrantError::InvalidRequest("missing grant_type".to_string()));
            }
            Some(value) => GrantType::try_from(value).map_err(GrantError::UnsupportedGrantType)?,
        };

        Ok(Self {
            grant_type,
            code: form.code.clone(),
            redirect_uri: form.redirect_uri.clone(),
            refresh_token: form.refresh_token.clone(),
            scope: form.scope.clone(),
        })
    }
}

/// Extract client credentials from HTTP Basic authentication or the form body
pub fn extract_client_credentials(
    headers: &HeaderMap,
    form: &TokenForm,
) -> Option<ClientCredentials> {
    // Try Authorization header (HTTP Basic)
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(encoded) = auth_str.strip_prefix("Basic ") {
                if let Ok(decoded) = BASE64_STANDARD.decode(encoded.trim()) {
                    if let Ok(credentials) = String::from_utf8(decoded) {
                        if let Some((client_id, client_secret)) = credentials.split_once(':') {
                            return Some(ClientCredentials {
                                client_id: client_id.to_string(),
                                client_secret: Some(client_secret.to_string()),
                            });
                        }
                    }
                }
            }
        }
    }

    // Fall back to form parameters
    form.client_id
        .as_ref()
        .filter(|client_id| !client_id.is_empty())
        .map(|client_id| ClientCredentials {
            client_id: client_id.clone(),
            client_secret: form.client_secret.clone(),
        })
}

async fn token(state: AppState, headers: HeaderMap, form: TokenForm) -> Response {
    let credentials = extract_client_credentials(&headers, &form);

    let request = match TokenRequest::try_from(&form) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    match state.coordinator.token(request, credentials).await {
        Ok(response) => {
            let mut response = Json(response).into_response();
            let headers = response.headers_mut();
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            response
        }
        Err(e) => e.into_response(),
    }
}

/// POST /oauth/token with a form-encoded body
pub async fn handle_oauth_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    match form {
        Ok(Form(form)) => token(state, headers, form).await,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "token request body rejected");
            GrantError::InvalidRequest(rejection.body_text()).into_response()
        }
    }
}

/// GET /oauth/token with query parameters
pub async fn handle_oauth_token_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<TokenForm>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(form)) => token(state, headers, form).await,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "token request query rejected");
            GrantError::InvalidRequest(rejection.body_text()).into_response()
        }
    }
}
