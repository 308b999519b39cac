// ============================
// partyline-backend/src/lib.rs
// ============================
//! Core of the partyline server: party membership, room fan-out and chat.

pub mod auth;
pub mod broadcast;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod membership;
pub mod metrics;
pub mod models;
pub mod party_store;
pub mod room_registry;
pub mod storage;
pub mod validation;
pub mod ws_router;

use crate::auth::{IdentityProvider, SessionIdentity};
use crate::broadcast::Broadcaster;
use crate::chat::ChatLog;
use crate::config::Settings;
use crate::error::AppError;
use crate::membership::MembershipCoordinator;
use crate::party_store::PartyStore;
use crate::room_registry::RoomRegistry;
use crate::storage::{FlatFileStorage, Storage};
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
pub struct AppState {
    /// Settings
    pub settings: Arc<Settings>,
    /// Resolves bearer tokens to users
    pub identity: Arc<dyn IdentityProvider>,
    /// Token issuer behind `POST /session`
    pub sessions: SessionIdentity,
    pub parties: Arc<PartyStore>,
    pub membership: MembershipCoordinator,
    pub rooms: RoomRegistry,
    pub broadcaster: Arc<Broadcaster>,
    pub chat: ChatLog,
}

impl AppState {
    /// Build the state on top of a storage backend, reloading every
    /// persisted party
    pub async fn new(storage: Arc<dyn Storage>, settings: Settings) -> Result<Self, AppError> {
        let settings = Arc::new(settings);
        let sessions = SessionIdentity::new(Duration::from_secs(settings.session_ttl_secs));

        let parties = Arc::new(PartyStore::load(storage.clone()).await?);
        let rooms = RoomRegistry::new();
        let broadcaster = Arc::new(Broadcaster::new(rooms.clone()));
        let membership =
            MembershipCoordinator::new(parties.clone(), broadcaster.clone(), settings.clone());
        let chat = ChatLog::new(
            storage,
            parties.clone(),
            broadcaster.clone(),
            settings.chat.clone(),
        );

        Ok(Self {
            settings,
            identity: Arc::new(sessions.clone()),
            sessions,
            parties,
            membership,
            rooms,
            broadcaster,
            chat,
        })
    }

    /// Build the state with flat-file storage under `settings.data_dir`
    pub async fn open(settings: Settings) -> anyhow::Result<Self> {
        let storage = Arc::new(FlatFileStorage::new(&settings.data_dir)?);
        Ok(Self::new(storage, settings).await?)
    }
}
