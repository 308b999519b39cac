// ============================
// partyline-backend/src/room_registry.rs
// ============================
//! In-memory map from party to the live connections subscribed to it.
//!
//! A room exists while it has at least one subscriber; the last unsubscribe
//! removes the key. Nothing here is persisted.
use crate::error::AppError;
use crate::events::RoomEvent;
use crate::models::User;
use dashmap::DashMap;
use partyline_common::PartyId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

pub type ConnectionId = u64;

/// Outbound queue of one connection
pub type EventSender = mpsc::Sender<Arc<RoomEvent>>;

/// A live connection registered in a room
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub connection_id: ConnectionId,
    pub user: User,
    pub sender: EventSender,
}

#[derive(Default)]
struct RegistryInner {
    rooms: DashMap<PartyId, HashMap<ConnectionId, Subscriber>>,
    next_connection: AtomicU64,
}

impl RegistryInner {
    fn remove(&self, party_id: PartyId, connection_id: ConnectionId) -> bool {
        let removed = {
            match self.rooms.get_mut(&party_id) {
                Some(mut room) => room.remove(&connection_id).is_some(),
                None => false,
            }
        };
        self.rooms.remove_if(&party_id, |_, room| room.is_empty());
        removed
    }
}

/// Registry of rooms. Cheap to clone; clones share the same rooms.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RegistryInner>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a party's room.
    ///
    /// The connection must carry a verified identity; the returned handle
    /// unsubscribes when dropped.
    pub fn subscribe(
        &self,
        party_id: PartyId,
        user: Option<User>,
        sender: EventSender,
    ) -> Result<SubscriptionHandle, AppError> {
        let user = user.ok_or(AppError::Unauthenticated)?;
        let connection_id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed) + 1;

        self.inner.rooms.entry(party_id).or_default().insert(
            connection_id,
            Subscriber {
                connection_id,
                user: user.clone(),
                sender,
            },
        );

        tracing::debug!(%party_id, connection_id, user = %user.id, "subscribed to room");

        Ok(SubscriptionHandle {
            party_id,
            connection_id,
            user,
            registry: Arc::downgrade(&self.inner),
        })
    }

    /// Remove a subscription. Safe to repeat.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe();
    }

    /// Drop one connection from a room, e.g. after a failed delivery
    pub(crate) fn evict(&self, party_id: PartyId, connection_id: ConnectionId) -> bool {
        self.inner.remove(party_id, connection_id)
    }

    /// Point-in-time recipients of a room. Connections whose receiving side
    /// is already gone are left out.
    pub fn members(&self, party_id: PartyId) -> Vec<Subscriber> {
        self.inner
            .rooms
            .get(&party_id)
            .map(|room| {
                room.values()
                    .filter(|s| !s.sender.is_closed())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, party_id: PartyId, connection_id: ConnectionId) -> bool {
        self.inner
            .rooms
            .get(&party_id)
            .is_some_and(|room| room.contains_key(&connection_id))
    }

    /// Number of rooms with at least one subscriber
    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }
}

/// Proof of a subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    party_id: PartyId,
    connection_id: ConnectionId,
    user: User,
    registry: Weak<RegistryInner>,
}

impl SubscriptionHandle {
    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Idempotent; a no-op once the room or the registry is gone
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.party_id, self.connection_id) {
                tracing::debug!(
                    party_id = %self.party_id,
                    connection_id = self.connection_id,
                    "unsubscribed from room"
                );
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for RegistryInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryInner")
            .field("rooms", &self.rooms.len())
            .finish()
    }
}
