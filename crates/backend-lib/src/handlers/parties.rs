// ============================
// partyline-backend/src/handlers/parties.rs
// ============================
//! Party management endpoints.
//!
//! Handlers only translate between HTTP and the membership coordinator;
//! every rule lives in the coordinator.
use crate::auth::{AuthUser, MaybeUser};
use crate::error::AppError;
use crate::membership::PartyView;
use crate::models::User;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use partyline_common::{
    JoinResponse, LeaveResponse, MembershipSummary, NoticeRequest, PartyDetail, PartyId,
    PartySpec, PartySummary,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/parties", get(list_parties).post(create_party))
        .route("/parties/{party_id}", get(view_party))
        .route("/parties/{party_id}/enter", post(enter_party))
        .route("/parties/{party_id}/join", post(join_party))
        .route("/parties/{party_id}/leave", post(leave_party))
        .route("/parties/{party_id}/notice", post(post_notice))
        .route("/me/parties", get(my_parties))
}

async fn list_parties(State(state): State<Arc<AppState>>) -> Json<Vec<PartySummary>> {
    Json(state.membership.list_open().await)
}

async fn create_party(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    body: Bytes,
) -> Result<(StatusCode, Json<PartySummary>), AppError> {
    let spec: PartySpec = serde_json::from_slice(&body)?;
    let record = state.membership.create_party(&user, spec).await?;
    Ok((StatusCode::CREATED, Json(record.summary())))
}

async fn view_party(
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<PartyId>,
    MaybeUser(viewer): MaybeUser,
) -> Result<Json<PartyDetail>, AppError> {
    let view = state
        .membership
        .view_party(party_id, viewer.as_ref().map(|u| u.id))
        .await?;
    Ok(Json(detail(&state, view, viewer.as_ref()).await?))
}

async fn enter_party(
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<PartyId>,
    AuthUser(user): AuthUser,
) -> Result<Json<PartyDetail>, AppError> {
    let view = state.membership.enter_party(party_id, &user).await?;
    Ok(Json(detail(&state, view, Some(&user)).await?))
}

async fn join_party(
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<PartyId>,
    AuthUser(user): AuthUser,
) -> Result<Json<JoinResponse>, AppError> {
    let joined = state.membership.join(party_id, &user).await?;
    Ok(Json(JoinResponse {
        party_id,
        change: joined.change,
        current_member_count: joined.snapshot.current_member_count,
    }))
}

async fn leave_party(
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<PartyId>,
    AuthUser(user): AuthUser,
) -> Result<Json<LeaveResponse>, AppError> {
    let outcome = state.membership.leave(party_id, &user).await?;
    Ok(Json(LeaveResponse { party_id, outcome }))
}

async fn post_notice(
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<PartyId>,
    AuthUser(user): AuthUser,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let notice: NoticeRequest = serde_json::from_slice(&body)?;
    let delivery = state
        .membership
        .post_notice(party_id, &user, &notice.message)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "recipients": delivery.recipients })),
    ))
}

async fn my_parties(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Json<Vec<MembershipSummary>> {
    Json(state.membership.recent_memberships(user.id).await)
}

// History is shown to authenticated viewers only
async fn detail(
    state: &AppState,
    view: PartyView,
    viewer: Option<&User>,
) -> Result<PartyDetail, AppError> {
    let history = match viewer {
        Some(_) => state
            .chat
            .recent_history(view.record.id(), state.chat.history_limit())
            .await?
            .lines(),
        None => Vec::new(),
    };

    Ok(PartyDetail {
        party: view.record.summary(),
        is_member: view.snapshot.is_member,
        is_host: view.snapshot.is_host,
        history,
    })
}
