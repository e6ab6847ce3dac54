use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    store: &'static str,
    uptime_seconds: u64,
    live_listeners: usize,
}

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Mark process start for uptime reporting
pub fn mark_started() {
    START_TIME.get_or_init(Instant::now);
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let start = START_TIME.get_or_init(Instant::now);

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.config.store.as_str(),
        uptime_seconds: start.elapsed().as_secs(),
        live_listeners: state.event_sender.receiver_count(),
    })
}
