use axum::{http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::session::SessionError;
use crate::domain::entities::{Avatar, Party};
use crate::domain::value_objects::JoinCode;

// ============================================================================
// Party views
// ============================================================================

/// Party document plus the derived views a client renders
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyView {
    #[serde(flatten)]
    pub party: Party,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub leader_id: Option<String>,
    /// `m:ss`, only for an active time trial
    pub time_remaining: Option<String>,
    pub is_host: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub avatar: Avatar,
    pub xp: u32,
    pub progress: f64,
    pub unique_creatures: usize,
}

impl PartyView {
    pub fn new(party: Party, viewer_id: Option<&str>, now: DateTime<Utc>) -> Self {
        let leaderboard = party
            .sorted_players()
            .into_iter()
            .enumerate()
            .map(|(index, player)| LeaderboardEntry {
                rank: index + 1,
                id: player.id.clone(),
                name: player.name.clone(),
                avatar: player.avatar.clone(),
                xp: player.xp,
                progress: party.progress(&player.id),
                unique_creatures: player.unique_creatures(),
            })
            .collect();

        Self {
            leader_id: party.leader().map(|p| p.id.clone()),
            time_remaining: party.time_remaining_formatted(now),
            is_host: viewer_id.is_some_and(|id| party.is_host(id)),
            leaderboard,
            party,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
            details: None,
        }),
    )
}

/// Map any application failure to a status and a stable error code
pub fn api_error(e: impl Into<SessionError>) -> ApiError {
    let e = e.into();
    let (status, code) = match &e {
        SessionError::InvalidCode(_) => (StatusCode::BAD_REQUEST, "INVALID_CODE"),
        SessionError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        SessionError::PartyNotFound | SessionError::PartyClosed => {
            (StatusCode::NOT_FOUND, "PARTY_NOT_FOUND")
        }
        SessionError::PartyAlreadyFinished => (StatusCode::CONFLICT, "PARTY_ALREADY_FINISHED"),
        SessionError::NotHost => (StatusCode::FORBIDDEN, "NOT_HOST"),
        SessionError::PlayerNotInParty | SessionError::NoActiveParty => {
            (StatusCode::FORBIDDEN, "PLAYER_NOT_IN_PARTY")
        }
        SessionError::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
        SessionError::CodeAllocation => (StatusCode::SERVICE_UNAVAILABLE, "CODE_ALLOCATION_FAILED"),
        SessionError::Corrupt(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_UNAVAILABLE"),
        SessionError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
    };

    if status.is_server_error() {
        tracing::error!("Request failed: {}", e);
    }

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: code.to_string(),
            details: e.is_retryable().then(|| "retryable".to_string()),
        }),
    )
}

/// Validate a join code taken from the path
pub fn parse_code(code: &str) -> Result<JoinCode, ApiError> {
    JoinCode::parse(code).map_err(api_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{GameMode, PartyPlayer};
    use crate::domain::repositories::StoreError;

    #[test]
    fn test_view_ranks_players_and_flags_host() {
        let host = PartyPlayer::new("a".into(), "Ana".into(), Avatar::Badge(1));
        let mut party = Party::new("5423".into(), host, GameMode::ScoreRace, 500, None);
        let mut ben = PartyPlayer::new("b".into(), "Ben".into(), Avatar::default());
        ben.xp = 250;
        party.add_player(ben);

        let view = PartyView::new(party, Some("a"), Utc::now());
        assert!(view.is_host);
        assert_eq!(view.leader_id.as_deref(), Some("b"));
        assert_eq!(view.leaderboard[0].id, "b");
        assert_eq!(view.leaderboard[0].rank, 1);
        assert_eq!(view.leaderboard[0].progress, 0.5);
        assert_eq!(view.time_remaining, None);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["code"], "5423");
        assert_eq!(json["gameMode"], "score_race");
        assert_eq!(json["leaderboard"][1]["name"], "Ana");
    }

    #[test]
    fn test_error_codes() {
        let (status, Json(body)) = api_error(SessionError::NotHost);
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, "NOT_HOST");

        let (status, Json(body)) = api_error(StoreError::Database("locked".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.code, "STORE_UNAVAILABLE");
        assert_eq!(body.details.as_deref(), Some("retryable"));

        let (status, Json(body)) = parse_code("12").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "INVALID_CODE");
        assert_eq!(body.error, "Please enter a 4-digit code");
    }
}
