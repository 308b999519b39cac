// ============================
// partyline-backend/src/ws_router.rs
// ============================
//! HTTP router and room connection handling.
use crate::auth::MaybeUser;
use crate::chat::ChatHistory;
use crate::error::AppError;
use crate::events::RoomEvent;
use crate::handlers;
use crate::metrics::{WS_ACTIVE, WS_CONNECTION};
use crate::models::{PartySnapshot, User};
use crate::room_registry::SubscriptionHandle;
use crate::AppState;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use metrics::{counter, gauge};
use partyline_common::{ClientFrame, PartyId};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

type EventReceiver = mpsc::Receiver<Arc<RoomEvent>>;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/parties/{party_id}/ws", get(party_ws))
        .merge(handlers::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Upgrade to a room connection.
///
/// Everything that can refuse the connection happens before the handshake,
/// so the client gets a plain HTTP status instead of an immediate close.
/// The connection is subscribed before history and count are read; a live
/// event can therefore never fall between replay and live delivery.
pub async fn party_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(party_id): Path<PartyId>,
    MaybeUser(user): MaybeUser,
) -> Result<Response, AppError> {
    let snapshot = state.membership.snapshot(party_id, None).await?;
    if !snapshot.status.is_open() {
        return Err(AppError::PartyClosed);
    }

    let (tx, rx) = mpsc::channel(state.settings.outbound_buffer);
    let subscription = state.rooms.subscribe(party_id, user, tx)?;

    // party_killed may have fanned out between the check above and subscribe
    if state.broadcaster.is_terminated(party_id) {
        tracing::debug!(%party_id, "party closed while subscribing");
        return Err(AppError::PartyClosed);
    }
    let snapshot = state.membership.snapshot(party_id, None).await?;
    if !snapshot.status.is_open() {
        return Err(AppError::PartyClosed);
    }
    let history = state
        .chat
        .recent_history(party_id, state.chat.history_limit())
        .await?;

    counter!(WS_CONNECTION).increment(1);
    Ok(ws.on_upgrade(move |socket| {
        handle_socket(socket, state, subscription, history, snapshot, rx)
    }))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    subscription: SubscriptionHandle,
    history: ChatHistory,
    snapshot: PartySnapshot,
    mut events: EventReceiver,
) {
    let party_id = subscription.party_id();
    let connection_id = subscription.connection_id();
    let user = subscription.user().clone();

    gauge!(WS_ACTIVE).increment(1.0);
    tracing::info!(%party_id, connection_id, user = %user.id, "room connection opened");

    let (mut sink, mut stream) = socket.split();
    let close = run_connection(
        &mut sink,
        &mut stream,
        &state,
        &user,
        &history,
        &snapshot,
        &mut events,
    )
    .await;

    subscription.unsubscribe();

    let reason = close.as_ref().map(|frame| frame.code);
    if let Some(frame) = close {
        let _ = sink.send(Message::Close(Some(frame))).await;
    }

    gauge!(WS_ACTIVE).decrement(1.0);
    tracing::info!(%party_id, connection_id, ?reason, "room connection closed");
}

/// Drive one connection until either side ends it. Returns the close frame
/// to send, or `None` when the client is already gone.
///
/// History goes out first, then the member count as of subscribing, then
/// live events. Queued events already covered by either are skipped.
async fn run_connection(
    sink: &mut SplitSink<WebSocket, Message>,
    stream: &mut SplitStream<WebSocket>,
    state: &AppState,
    user: &User,
    history: &ChatHistory,
    snapshot: &PartySnapshot,
    events: &mut EventReceiver,
) -> Option<CloseFrame> {
    let party_id = snapshot.party_id;
    for message in history {
        if send_event(sink, &RoomEvent::chat(message)).await.is_err() {
            return None;
        }
    }
    let replayed_through = history.last_seq().unwrap_or(0);

    if send_event(sink, &RoomEvent::count(snapshot)).await.is_err() {
        return None;
    }
    let mut counted_through = snapshot.revision;

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let frame = match serde_json::from_str::<ClientFrame>(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::debug!(%party_id, error = %e, "malformed client frame");
                            return Some(close(close_code::POLICY, "malformed frame"));
                        },
                    };

                    match state.chat.send(party_id, user, &frame.message).await {
                        Ok(message) => {
                            tracing::debug!(%party_id, seq = message.seq, "chat frame accepted");
                        },
                        Err(AppError::InvalidInput(e)) => {
                            tracing::debug!(%party_id, error = %e, "rejected chat content");
                            return Some(close(close_code::POLICY, "invalid message"));
                        },
                        Err(AppError::PartyClosed) => {
                            return Some(close(close_code::NORMAL, "party closed"));
                        },
                        Err(e) => {
                            tracing::error!(%party_id, user = %user.id, error = %e, "chat send failed");
                            return Some(close(close_code::ERROR, "message could not be saved"));
                        },
                    }
                },
                Some(Ok(Message::Binary(_))) => {
                    return Some(close(close_code::UNSUPPORTED, "binary frames are not supported"));
                },
                Some(Ok(Message::Close(_))) | None => return None,
                // ping/pong are answered by the protocol layer
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    tracing::debug!(%party_id, error = %e, "room connection errored");
                    return None;
                },
            },
            outbound = events.recv() => match outbound {
                Some(event) => {
                    match *event {
                        RoomEvent::Chat { seq, .. } if seq <= replayed_through => continue,
                        RoomEvent::CountUpdate { revision, .. } => {
                            if revision <= counted_through {
                                continue;
                            }
                            counted_through = revision;
                        },
                        _ => {},
                    }
                    if send_event(sink, &event).await.is_err() {
                        return None;
                    }
                    if event.is_terminal() {
                        return Some(close(close_code::NORMAL, "party closed"));
                    }
                },
                // evicted by the broadcaster
                None => return Some(close(close_code::AGAIN, "connection fell behind")),
            },
        }
    }
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &RoomEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(&event.to_wire()).map_err(axum::Error::new)?;
    sink.send(Message::Text(json.into())).await
}

fn close(code: u16, reason: &'static str) -> CloseFrame {
    CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }
}
