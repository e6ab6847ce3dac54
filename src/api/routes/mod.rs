pub mod auth;
pub mod health;
pub mod party;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::api::middleware::auth_middleware;
use crate::api::sse;
use crate::api::AppState;

/// Create the main API router
pub fn create_api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .nest("/auth", auth::create_auth_router())
        .nest("/party", create_party_router(state.clone()))
        .route("/events", get(sse::activity_handler))
        .route("/health", get(health::health_handler))
        .with_state(state)
}

/// Create party router
fn create_party_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // EventSource cannot send headers, so the stream authenticates by query token
    let public = Router::new().route("/:code/events", get(sse::party_events_handler));

    let protected = Router::new()
        .route("/", post(party::create_party))
        .route("/:code", get(party::get_party))
        .route("/:code/join", post(party::join_party))
        .route("/:code/leave", post(party::leave_party))
        .route("/:code/start", post(party::start_party))
        .route("/:code/catch", post(party::record_catch))
        .route("/:code/quiz", post(party::record_quiz_bonus))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    public.merge(protected).with_state(state)
}
