//! Main router configuration assembling the OAuth endpoints.

use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{
    context::AppState,
    handler_authorize::handle_oauth_authorize,
    handler_clients::{
        app_create_client_handler, app_delete_client_handler, app_get_client_handler,
        app_update_client_handler,
    },
    handler_token::{handle_oauth_token, handle_oauth_token_query},
    handler_verify::handle_oauth_verify,
};

/// Build the application router
pub fn build_router(ctx: AppState) -> Router {
    let mut oauth_routes = Router::new()
        .route("/authorize", get(handle_oauth_authorize))
        .route(
            "/token",
            post(handle_oauth_token).get(handle_oauth_token_query),
        )
        .route("/verify", get(handle_oauth_verify));

    // Conditionally add client API endpoints
    if *ctx.config.enable_client_api.as_ref() {
        oauth_routes = oauth_routes
            .route("/clients", post(app_create_client_handler))
            .route(
                "/clients/{client_id}",
                get(app_get_client_handler)
                    .put(app_update_client_handler)
                    .delete(app_delete_client_handler),
            );
    }

    let cors = CorsLayer::new()
        .allow_origin(ctx.config.allowed_origins.as_ref().clone())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    Router::new()
        .nest("/oauth", oauth_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
