//! Shared setup for the integration tests.
#![allow(dead_code)]

use partyline_backend::{
    config::Settings,
    events::RoomEvent,
    models::User,
    room_registry::SubscriptionHandle,
    storage::{FlatFileStorage, Storage},
    ws_router, AppState,
};
use partyline_common::{PartyId, PartySpec};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// State backed by flat files in a fresh temp directory.
/// Keep the directory in scope for the duration of the test.
pub async fn setup() -> (Arc<AppState>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(FlatFileStorage::new(temp_dir.path()).unwrap());
    let state = with_storage(storage, &temp_dir).await;
    (state, temp_dir)
}

pub async fn with_storage(storage: Arc<dyn Storage>, temp_dir: &TempDir) -> Arc<AppState> {
    let settings = Settings {
        data_dir: temp_dir.path().to_path_buf(),
        ..Settings::default()
    };
    Arc::new(
        AppState::new(storage, settings)
            .await
            .expect("Failed to create AppState for test"),
    )
}

pub fn spec(max_members: u32) -> PartySpec {
    PartySpec {
        activity: "valorant".to_string(),
        mode: "competitive".to_string(),
        description: "chill squad".to_string(),
        max_members,
        mic_required: true,
    }
}

/// Create a party hosted by a new user
pub async fn open_party(state: &AppState, max_members: u32) -> (User, PartyId) {
    let host = User::new("host");
    let record = state
        .membership
        .create_party(&host, spec(max_members))
        .await
        .unwrap();
    (host, record.id())
}

/// Subscribe a listener to a room
pub fn listen(
    state: &AppState,
    party_id: PartyId,
    nickname: &str,
) -> (SubscriptionHandle, mpsc::Receiver<Arc<RoomEvent>>) {
    let (tx, rx) = mpsc::channel(256);
    let handle = state
        .rooms
        .subscribe(party_id, Some(User::new(nickname)), tx)
        .unwrap();
    (handle, rx)
}

/// Everything queued for a listener so far
pub fn drain(rx: &mut mpsc::Receiver<Arc<RoomEvent>>) -> Vec<RoomEvent> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|event| (*event).clone())
        .collect()
}

pub fn counts(events: &[RoomEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|event| match event {
            RoomEvent::CountUpdate { count, .. } => Some(*count),
            _ => None,
        })
        .collect()
}

pub fn chat_texts(events: &[RoomEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            RoomEvent::Chat { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Serve the full router on an ephemeral port
pub async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = ws_router::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
