use axum::Router;
use axum::routing::{get, patch, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::status))
        .route(
            "/api/users",
            post(handlers::create_user).get(handlers::list_users),
        )
        .route(
            "/api/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route(
            "/api/users/{id}/deactivate",
            patch(handlers::deactivate_user),
        )
        .route(
            "/api/users/username/{username}",
            get(handlers::get_user_by_username),
        )
        .route("/api/users/email/{email}", get(handlers::get_user_by_email))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
