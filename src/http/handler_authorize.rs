//! Handles GET /oauth/authorize - Issues an authorization code and redirects back to the client

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    response::{IntoResponse, Redirect, Response},
};
use url::Url;

use super::context::AppState;
use crate::errors::GrantError;
use crate::oauth::types::AuthorizationRequest;

/// Append query parameters to a redirect URI, keeping the ones it already has.
fn redirect_with(redirect_uri: &str, params: &[(&str, &str)]) -> Option<String> {
    let mut url = Url::parse(redirect_uri).ok()?;
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }
    Some(url.to_string())
}

pub async fn handle_oauth_authorize(
    State(state): State<AppState>,
    query: Result<Query<AuthorizationRequest>, QueryRejection>,
) -> Response {
    let request = match query {
        Ok(Query(request)) => request,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "authorization query rejected");
            return GrantError::InvalidRequest(rejection.body_text()).into_response();
        }
    };

    match state.coordinator.authorize(request).await {
        Ok(grant) => {
            let mut params = vec![("code", grant.code.as_str())];
            if !grant.state.is_empty() {
                params.push(("state", grant.state.as_str()));
            }
            match redirect_with(&grant.redirect_uri, &params) {
                Some(location) => Redirect::to(&location).into_response(),
                None => {
                    tracing::error!(client_id = %grant.client_id, "registered redirect_uri is not a valid URL");
                    GrantError::InvalidRequest("redirect_uri".to_string()).into_response()
                }
            }
        }
        Err(rejection) => {
            let error = rejection.error;
            let Some(redirect_uri) = rejection.redirect_uri else {
                return error.into_response();
            };

            let mut params = vec![
                ("error", error.error_code()),
                ("error_description", error.description()),
            ];
            if let Some(state) = rejection.state.as_deref() {
                params.push(("state", state));
            }
            match redirect_with(&redirect_uri, &params) {
                Some(location) => Redirect::to(&location).into_response(),
                None => error.into_response(),
            }
        }
    }
}
