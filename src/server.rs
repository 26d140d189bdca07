use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::routes;
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes, no auth required (health probes only)
    let public_routes = Router::new().route("/health", get(routes::health::health_check));

    // Protected routes, require CODEINDEX_AUTH_TOKEN when configured
    let protected_routes = Router::new()
        .route("/shutdown", post(routes::health::shutdown_handler))
        // Tool-call surface
        .route("/api/search", post(routes::search::search_code))
        .route("/api/files/read", post(routes::files::read_file))
        .route("/api/files/write", post(routes::files::write_file))
        // Index maintenance
        .route("/api/index/sync", post(routes::index::sync_index))
        .route("/api/index/status", get(routes::index::index_status))
        .route("/api/index/reembed", post(routes::index::reembed))
        // Direct store access
        .route("/api/documents", post(routes::documents::add_documents))
        .route(
            "/api/documents/{id}",
            get(routes::documents::get_document).delete(routes::documents::delete_document),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    public_routes
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Validates `Authorization: Bearer <token>` against the configured auth
/// token. Without a configured token every request passes (development mode).
async fn auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, (StatusCode, axum::Json<serde_json::Value>)> {
    let Some(expected_token) = state.config.auth_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header) if header.len() > 7 && header[..7].eq_ignore_ascii_case("bearer ") => {
            if &header[7..] == expected_token {
                Ok(next.run(req).await)
            } else {
                tracing::warn!("Auth token mismatch, rejecting request");
                Err(unauthorized())
            }
        }
        _ => {
            tracing::warn!("Missing or malformed Authorization header, rejecting request");
            Err(unauthorized())
        }
    }
}

fn unauthorized() -> (StatusCode, axum::Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({"error": "Unauthorized", "status": 401})),
    )
}
