use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::dto::{api_error, error_response, parse_code, ApiError, PartyView};
use crate::api::middleware::Claims;
use crate::api::AppState;
use crate::application::party::{
    CreateParty, CreatePartyInput, FinishParty, GetParty, GetPartyInput, JoinParty, JoinPartyInput,
    LeaveParty, LeavePartyInput, RecordScore, RecordScoreInput, StartParty, StartPartyInput,
};
use crate::domain::entities::{GameMode, Party, PartyLocation};
use crate::domain::value_objects::{RaceSettings, ScoreEvent, QUIZ_BONUS_XP};
use crate::infrastructure::app_state::PartyEvent;

/// Largest quiz bonus a client may claim in one answer
const MAX_QUIZ_BONUS_XP: u32 = 5 * QUIZ_BONUS_XP;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePartyRequest {
    pub game_mode: Option<String>,
    pub target_value: Option<u32>,
    pub location_id: Option<String>,
    pub location_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchRequest {
    pub creature_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuizRequest {
    pub xp: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PartyResponse {
    pub success: bool,
    pub party: PartyView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPartyResponse {
    pub success: bool,
    pub party: PartyView,
    pub newly_joined: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeavePartyResponse {
    pub success: bool,
    pub message: String,
    pub new_host_id: Option<String>,
    pub party_deleted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResponse {
    pub success: bool,
    pub xp_awarded: u32,
    pub party: PartyView,
}

impl CreatePartyRequest {
    fn settings(&self) -> Result<RaceSettings, ApiError> {
        let game_mode = match self.game_mode.as_deref() {
            None => None,
            Some(mode) => Some(GameMode::from_str(mode).ok_or_else(|| {
                error_response(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    format!("Unknown game mode: {}", mode),
                )
            })?),
        };

        let settings = match (game_mode, self.target_value) {
            (None, None) => RaceSettings::default(),
            (Some(GameMode::TimeTrial), None) => RaceSettings::quick_time_trial(),
            (Some(GameMode::ScoreRace), None) => RaceSettings::quick_score_race(),
            (mode, Some(target)) => RaceSettings::new(mode.unwrap_or(GameMode::ScoreRace), target),
        };
        Ok(settings)
    }

    fn location(&self) -> Option<PartyLocation> {
        self.location_id.as_ref().map(|id| PartyLocation {
            id: id.clone(),
            name: self.location_name.clone().unwrap_or_default(),
        })
    }
}

fn view(party: Party, claims: &Claims) -> PartyView {
    PartyView::new(party, Some(&claims.user_id), Utc::now())
}

/// Run the completion check after a score and announce a finish
async fn settle_completion(state: &AppState, party: Party) -> Result<Party, ApiError> {
    if !crate::domain::services::needs_finish(&party, Utc::now()) {
        return Ok(party);
    }

    let output = FinishParty::new(state.party_store.clone())
        .execute(&party.code)
        .await
        .map_err(api_error)?;

    if output.finished_now {
        broadcast_finished(state, &output.party);
    }
    Ok(output.party)
}

pub(crate) fn broadcast_finished(state: &AppState, party: &Party) {
    let winner = party.leader().map(|p| p.id.clone());
    state.broadcast_event(
        PartyEvent::new(&party.code, "partyFinished", winner.clone()).with_data(serde_json::json!({
            "winnerId": winner,
            "podium": party.podium().iter().map(|p| &p.id).collect::<Vec<_>>(),
        })),
    );
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST /api/party - Create a new party hosted by the caller
pub async fn create_party(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CreatePartyRequest>,
) -> Result<(StatusCode, Json<PartyResponse>), ApiError> {
    let settings = body.settings()?;

    let use_case = CreateParty::new(state.party_store.clone())
        .with_allocation_attempts(state.config.code_allocation_attempts);
    let result = use_case
        .execute(CreatePartyInput {
            host: claims.profile(),
            settings,
            location: body.location(),
        })
        .await
        .map_err(api_error)?;

    state.broadcast_event(
        PartyEvent::new(&result.party.code, "partyCreated", Some(claims.user_id.clone())).with_data(
            serde_json::json!({
                "gameMode": result.party.game_mode,
                "targetValue": result.party.target_value,
            }),
        ),
    );

    Ok((
        StatusCode::CREATED,
        Json(PartyResponse {
            success: true,
            party: view(result.party, &claims),
        }),
    ))
}

/// GET /api/party/:code - Party with leaderboard
pub async fn get_party(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<Json<PartyResponse>, ApiError> {
    let party = GetParty::new(state.party_store.clone())
        .execute(GetPartyInput { code })
        .await
        .map_err(api_error)?;

    Ok(Json(PartyResponse {
        success: true,
        party: view(party, &claims),
    }))
}

/// POST /api/party/:code/join - Join by code (idempotent)
pub async fn join_party(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<Json<JoinPartyResponse>, ApiError> {
    let result = JoinParty::new(state.party_store.clone())
        .execute(JoinPartyInput {
            player: claims.profile(),
            code,
        })
        .await
        .map_err(api_error)?;

    if result.newly_joined {
        state.broadcast_event(
            PartyEvent::new(&result.party.code, "playerJoined", Some(claims.user_id.clone()))
                .with_data(serde_json::json!({
                    "name": claims.name,
                    "playerCount": result.party.players.len(),
                })),
        );
    }

    Ok(Json(JoinPartyResponse {
        success: true,
        party: view(result.party, &claims),
        newly_joined: result.newly_joined,
    }))
}

/// POST /api/party/:code/leave - Leave; the last player out deletes the party
pub async fn leave_party(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<Json<LeavePartyResponse>, ApiError> {
    let code = parse_code(&code)?;

    let result = LeaveParty::new(state.party_store.clone())
        .execute(LeavePartyInput {
            user_id: claims.user_id.clone(),
            code: code.to_string(),
        })
        .await
        .map_err(api_error)?;

    let message = if result.party_deleted {
        state.broadcast_event(PartyEvent::new(code.as_str(), "partyDeleted", Some(claims.user_id.clone())));
        "Left party; party closed".to_string()
    } else {
        state.broadcast_event(
            PartyEvent::new(code.as_str(), "playerLeft", Some(claims.user_id.clone())).with_data(
                serde_json::json!({ "newHostId": result.new_host_id }),
            ),
        );
        "Left party".to_string()
    };

    Ok(Json(LeavePartyResponse {
        success: true,
        message,
        new_host_id: result.new_host_id,
        party_deleted: result.party_deleted,
    }))
}

/// POST /api/party/:code/start - Start the race (host only)
pub async fn start_party(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<Json<PartyResponse>, ApiError> {
    let code = parse_code(&code)?;

    let result = StartParty::new(state.party_store.clone())
        .execute(StartPartyInput {
            user_id: claims.user_id.clone(),
            code: code.to_string(),
        })
        .await
        .map_err(api_error)?;

    state.broadcast_event(
        PartyEvent::new(code.as_str(), "partyStarted", Some(claims.user_id.clone())).with_data(
            serde_json::json!({ "startTime": result.party.start_time }),
        ),
    );

    Ok(Json(PartyResponse {
        success: true,
        party: view(result.party, &claims),
    }))
}

/// POST /api/party/:code/catch - Credit a creature catch
pub async fn record_catch(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
    Json(body): Json<CatchRequest>,
) -> Result<Json<ScoreResponse>, ApiError> {
    record_score(&state, &claims, &code, ScoreEvent::catch_creature(body.creature_id)).await
}

/// POST /api/party/:code/quiz - Credit a quiz bonus
pub async fn record_quiz_bonus(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
    body: Option<Json<QuizRequest>>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let amount = body.and_then(|Json(b)| b.xp).unwrap_or(QUIZ_BONUS_XP);
    if amount == 0 || amount > MAX_QUIZ_BONUS_XP {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            format!("Quiz bonus must be between 1 and {} XP", MAX_QUIZ_BONUS_XP),
        ));
    }

    record_score(&state, &claims, &code, ScoreEvent::QuizBonus { amount }).await
}

async fn record_score(
    state: &AppState,
    claims: &Claims,
    code: &str,
    event: ScoreEvent,
) -> Result<Json<ScoreResponse>, ApiError> {
    let code = parse_code(code)?;
    let kind = event.kind();

    let result = RecordScore::new(state.party_store.clone())
        .execute(RecordScoreInput {
            user_id: claims.user_id.clone(),
            code: code.to_string(),
            event,
        })
        .await
        .map_err(api_error)?;

    state.broadcast_event(
        PartyEvent::new(code.as_str(), "scoreRecorded", Some(claims.user_id.clone())).with_data(
            serde_json::json!({
                "kind": kind,
                "xpAwarded": result.xp_awarded,
            }),
        ),
    );

    let party = settle_completion(state, result.party).await?;

    Ok(Json(ScoreResponse {
        success: true,
        xp_awarded: result.xp_awarded,
        party: view(party, claims),
    }))
}
