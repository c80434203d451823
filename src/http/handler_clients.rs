//! Handles /oauth/clients - Administrative client registration, lookup, update and removal

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::Json as ResponseJson,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    errors::StorageError,
    http::context::AppState,
    oauth::types::{Client, Metadata, generate_client_id, generate_token, is_valid_redirect_uri},
};

type ApiError = (StatusCode, ResponseJson<Value>);

/// Client registration request
#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub metadata: Option<Value>,
}

/// Partial client update
#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub metadata: Option<Value>,
}

/// Client as returned by the API
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientResponse {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl From<Client> for ClientResponse {
    fn from(client: Client) -> Self {
        // Metadata written outside the API may not be JSON.
        let metadata = if client.metadata.is_empty() {
            Value::Null
        } else {
            client.metadata.to_json().unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(client.metadata.as_bytes()).into_owned())
            })
        };

        Self {
            client_id: client.id,
            client_secret: client.secret,
            redirect_uri: client.redirect_uri,
            metadata,
            created_at: client.created_at,
        }
    }
}

fn api_error(status: StatusCode, error: &str, description: impl Into<String>) -> ApiError {
    (
        status,
        ResponseJson(json!({
            "error": error,
            "error_description": description.into()
        })),
    )
}

fn storage_error(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound(_) => {
            api_error(StatusCode::NOT_FOUND, "client_not_found", "client not found")
        }
        StorageError::AlreadyExists(_) => api_error(
            StatusCode::CONFLICT,
            "client_exists",
            "client_id already registered",
        ),
        err => {
            tracing::error!(error = ?err, "client storage failure");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Internal server error",
            )
        }
    }
}

fn metadata_from(value: Option<Value>) -> Result<Metadata, ApiError> {
    match value {
        None | Some(Value::Null) => Ok(Metadata::empty()),
        Some(value) => Metadata::from_json(&value).map_err(|e| {
            api_error(
                StatusCode::BAD_REQUEST,
                "invalid_client_metadata",
                e.to_string(),
            )
        }),
    }
}

fn check_redirect_uri(redirect_uri: &str) -> Result<(), ApiError> {
    if is_valid_redirect_uri(redirect_uri) {
        Ok(())
    } else {
        Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_redirect_uri",
            "redirect_uri must be an absolute URI without a fragment",
        ))
    }
}

pub async fn app_create_client_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateClientRequest>,
) -> Result<(StatusCode, ResponseJson<ClientResponse>), ApiError> {
    check_redirect_uri(&request.redirect_uri)?;

    let client = Client::new(
        request
            .client_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_client_id),
        request
            .client_secret
            .filter(|secret| !secret.is_empty())
            .unwrap_or_else(generate_token),
        request.redirect_uri,
        metadata_from(request.metadata)?,
    );

    let coordinator = &state.coordinator;
    coordinator
        .bounded(coordinator.storage().create_client(&client))
        .await
        .map_err(storage_error)?;

    tracing::info!(client_id = %client.id, "client registered");
    Ok((StatusCode::CREATED, ResponseJson(client.into())))
}

pub async fn app_get_client_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<ResponseJson<ClientResponse>, ApiError> {
    let coordinator = &state.coordinator;
    let client = coordinator
        .bounded(coordinator.storage().get_client(&client_id))
        .await
        .map_err(storage_error)?;

    Ok(ResponseJson(client.into()))
}

pub async fn app_update_client_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Json(request): Json<UpdateClientRequest>,
) -> Result<ResponseJson<ClientResponse>, ApiError> {
    let coordinator = &state.coordinator;
    let mut client = coordinator
        .bounded(coordinator.storage().get_client(&client_id))
        .await
        .map_err(storage_error)?;

    if let Some(redirect_uri) = request.redirect_uri {
        check_redirect_uri(&redirect_uri)?;
        client.redirect_uri = redirect_uri;
    }
    if let Some(secret) = request.client_secret.filter(|secret| !secret.is_empty()) {
        client.secret = secret;
    }
    if request.metadata.is_some() {
        client.metadata = metadata_from(request.metadata)?;
    }

    coordinator
        .bounded(coordinator.storage().update_client(&client))
        .await
        .map_err(storage_error)?;

    tracing::info!(client_id = %client.id, "client updated");
    Ok(ResponseJson(client.into()))
}

pub async fn app_delete_client_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let coordinator = &state.coordinator;
    coordinator
        .bounded(coordinator.storage().get_client(&client_id))
        .await
        .map_err(storage_error)?;
    coordinator
        .bounded(coordinator.storage().remove_client(&client_id))
        .await
        .map_err(storage_error)?;

    tracing::info!(client_id = %client_id, "client removed");
    Ok(StatusCode::NO_CONTENT)
}
