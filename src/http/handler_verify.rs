//! Handles GET /oauth/verify - Bearer token introspection

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};

use super::context::AppState;
use crate::errors::GrantError;
use crate::oauth::types::IntrospectionResponse;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub async fn handle_oauth_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<IntrospectionResponse>, GrantError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| GrantError::InvalidToken("missing bearer token".to_string()))?;

    let info = state.coordinator.validate_bearer(token).await?;
    Ok(Json(IntrospectionResponse::from(info)))
}
