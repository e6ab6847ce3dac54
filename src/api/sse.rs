use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_broadcast::RecvError;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures::stream::Stream;
use serde::Deserialize;

use crate::api::dto::{api_error, parse_code, ApiError, PartyView};
use crate::api::routes::party::broadcast_finished;
use crate::application::party::FinishParty;
use crate::domain::entities::Party;
use crate::domain::services::needs_finish;
use crate::infrastructure::app_state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
/// Time trials end on the clock, so streams re-check completion this often
const COMPLETION_TICK: Duration = Duration::from_secs(1);

#[derive(Deserialize)]
pub struct SseParams {
    token: Option<String>,
}

impl SseParams {
    /// Viewer id from an optional token; invalid tokens watch anonymously
    fn viewer_id(&self, state: &AppState) -> Option<String> {
        self.token
            .as_deref()
            .and_then(|token| state.jwt_service.verify(token).ok())
            .map(|claims| claims.user_id)
    }
}

enum PartyStreamStep {
    Heartbeat,
    Tick,
    Changed,
    Closed,
}

fn snapshot_event(party: &Party, viewer_id: Option<&str>) -> Event {
    let view = PartyView::new(party.clone(), viewer_id, Utc::now());
    Event::default()
        .event("snapshot")
        .data(serde_json::to_string(&view).unwrap_or_default())
}

fn deleted_event(code: &str) -> Event {
    Event::default()
        .event("deleted")
        .data(serde_json::json!({ "code": code }).to_string())
}

/// GET /api/party/:code/events - Live snapshots of one party.
///
/// Every open stream also acts as a completion checker: it evaluates the win
/// condition on each snapshot and on a short tick. The finish transition is
/// idempotent, so many streams checking at once is harmless.
pub async fn party_events_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(params): Query<SseParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let code = parse_code(&code)?.to_string();
    let viewer_id = params.viewer_id(&state);

    let mut snapshots = state
        .party_store
        .subscribe(&code)
        .await
        .map_err(api_error)?;

    let finisher = FinishParty::new(state.party_store.clone());

    let stream = async_stream::stream! {
        tracing::debug!("Party stream for {} started (viewer {:?})", code, viewer_id);

        let mut heartbeat_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut completion_interval = tokio::time::interval(COMPLETION_TICK);
        // Both intervals fire immediately; the initial snapshot covers that
        heartbeat_interval.tick().await;
        completion_interval.tick().await;

        let mut step = PartyStreamStep::Changed;

        loop {
            let current = match step {
                PartyStreamStep::Closed => {
                    yield Ok(deleted_event(&code));
                    break;
                }
                PartyStreamStep::Heartbeat => {
                    tracing::trace!("Party stream heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                    None
                }
                PartyStreamStep::Tick => {
                    let current = snapshots.borrow().clone();
                    current
                }
                PartyStreamStep::Changed => {
                    let current = snapshots.borrow_and_update().clone();
                    let Some(party) = current else {
                        yield Ok(deleted_event(&code));
                        break;
                    };
                    yield Ok(snapshot_event(&party, viewer_id.as_deref()));
                    Some(party)
                }
            };

            if let Some(party) = current.filter(|party| needs_finish(party, Utc::now())) {
                match finisher.execute(&party.code).await {
                    Ok(output) if output.finished_now => broadcast_finished(&state, &output.party),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Completion check for party {} failed: {}", party.code, e),
                }
            }

            step = tokio::select! {
                _ = heartbeat_interval.tick() => PartyStreamStep::Heartbeat,
                _ = completion_interval.tick() => PartyStreamStep::Tick,
                changed = snapshots.changed() => match changed {
                    Ok(()) => PartyStreamStep::Changed,
                    Err(_) => PartyStreamStep::Closed,
                },
            };
        }

        tracing::debug!("Party stream for {} ended", code);
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /api/events - App-wide party activity feed
pub async fn activity_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SseParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let viewer_id = params.viewer_id(&state);

    // Subscribe to events - new_receiver() gives an active receiver
    let mut receiver = state.event_sender.new_receiver();

    let stream = async_stream::stream! {
        tracing::debug!("Activity stream started (viewer {:?})", viewer_id);

        // Send initial connected event
        yield Ok(Event::default()
            .event("connected")
            .data(serde_json::json!({
                "message": "Connected to SSE stream",
                "timestamp": Utc::now().timestamp_millis()
            }).to_string()));

        let mut heartbeat_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat_interval.tick().await;

        loop {
            let next = tokio::select! {
                _ = heartbeat_interval.tick() => None,
                result = receiver.recv() => Some(result),
            };

            match next {
                None => {
                    tracing::trace!("Activity stream heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }
                Some(Ok(event)) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event("event").data(json));
                }
                Some(Err(RecvError::Overflowed(skipped))) => {
                    tracing::debug!("Activity stream lagged, skipped {} events", skipped);
                }
                Some(Err(RecvError::Closed)) => {
                    tracing::warn!("Activity channel closed, ending stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
