use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::dto::{error_response, ApiError};
use crate::domain::entities::{Avatar, PlayerProfile};
use crate::infrastructure::app_state::AppState;

/// Longest display name accepted for a guest
const MAX_NAME_LENGTH: usize = 32;

/// Create auth router
pub fn create_auth_router() -> Router<Arc<AppState>> {
    Router::new().route("/guest", post(guest_handler))
}

// ========== DTOs ==========

#[derive(Debug, Default, Deserialize)]
pub struct GuestRequest {
    name: Option<String>,
    avatar: Option<Avatar>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestResponse {
    success: bool,
    user: GuestUserInfo,
    token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestUserInfo {
    id: String,
    name: String,
    avatar: Avatar,
}

// ========== Handlers ==========

/// POST /api/auth/guest - Issue an identity token for a new guest player
async fn guest_handler(
    State(state): State<Arc<AppState>>,
    body: Option<Json<GuestRequest>>,
) -> Result<(StatusCode, Json<GuestResponse>), ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let name = body.name.as_deref().map(str::trim).unwrap_or_default();
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            format!("Name must be at most {} characters", MAX_NAME_LENGTH),
        ));
    }
    let name = if name.is_empty() { PlayerProfile::DEFAULT_NAME } else { name };

    let profile = PlayerProfile::new(
        uuid::Uuid::new_v4().to_string(),
        name,
        body.avatar.unwrap_or_default(),
    );

    let token = state.jwt_service.sign(&profile).map_err(|e| {
        tracing::error!("Failed to sign guest token: {}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "TOKEN_ERROR", "Failed to issue token")
    })?;

    tracing::info!("Issued guest identity {} ({})", profile.user_id, profile.display_name);

    Ok((
        StatusCode::CREATED,
        Json(GuestResponse {
            success: true,
            user: GuestUserInfo {
                id: profile.user_id,
                name: profile.display_name,
                avatar: profile.avatar,
            },
            token,
        }),
    ))
}
