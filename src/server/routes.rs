use axum::{
    routing::{get, post, put},
    Router,
};

use super::handlers;
use super::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health_check))
        // Schemas
        .route("/api/schemas", get(handlers::list_schemas))
        // Sessions
        .route("/api/sessions", post(handlers::create_session))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/api/sessions/{id}/view", put(handlers::set_view))
        .route("/api/sessions/{id}/extract", post(handlers::extract))
        .route("/api/sessions/{id}/download", get(handlers::download))
}
