// ============================
// partyline-backend/src/handlers/session.rs
// ============================
use crate::auth::BearerToken;
use crate::error::AppError;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use partyline_common::{SessionRequest, SessionResponse};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/session", post(create_session).delete(end_session))
}

/// Issue an identity token for a fresh user
async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let request: SessionRequest = serde_json::from_slice(&body)?;
    let (token, user) = state.sessions.issue(&request.nickname).await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            user_id: user.id,
            nickname: user.nickname,
        }),
    ))
}

/// Revoke the presented token
async fn end_session(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<StatusCode, AppError> {
    if state.sessions.revoke(&token).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Unauthenticated)
    }
}
