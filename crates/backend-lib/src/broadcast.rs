// ============================
// partyline-backend/src/broadcast.rs
// ============================
//! Fan-out of room events to live connections.
//!
//! Sends into one room are serialized by a per-room gate, so every
//! connection observes the same relative order of events. Delivery is a
//! non-blocking `try_send` per connection: a full or closed queue fails only
//! that connection, which is then evicted from the room.
use crate::error::AppError;
use crate::events::RoomEvent;
use crate::metrics::{BROADCAST_DELIVERED, BROADCAST_FAILED};
use crate::models::{ChatMessage, PartySnapshot};
use crate::room_registry::RoomRegistry;
use dashmap::{mapref::entry::Entry, DashMap, DashSet};
use metrics::counter;
use parking_lot::Mutex;
use partyline_common::PartyId;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

/// Outcome of one broadcast call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Connections the event was queued for
    pub recipients: usize,
    /// Connections that failed and were evicted
    pub failed: usize,
    /// The event was dropped without being sent (terminal room or stale count)
    pub suppressed: bool,
}

impl Delivery {
    fn suppressed() -> Self {
        Self {
            suppressed: true,
            ..Self::default()
        }
    }
}

pub struct Broadcaster {
    registry: RoomRegistry,
    gates: DashMap<PartyId, Arc<Mutex<()>>>,
    /// Parties that already received `party_killed`
    terminated: DashSet<PartyId>,
    /// Revision of the last count_update sent per room
    count_revisions: DashMap<PartyId, u64>,
}

impl Broadcaster {
    pub fn new(registry: RoomRegistry) -> Self {
        Self {
            registry,
            gates: DashMap::new(),
            terminated: DashSet::new(),
            count_revisions: DashMap::new(),
        }
    }

    pub fn is_terminated(&self, party_id: PartyId) -> bool {
        self.terminated.contains(&party_id)
    }

    /// Relay a chat message. Call only once the message is durable.
    pub fn chat(&self, party_id: PartyId, message: &ChatMessage) -> Delivery {
        self.send_live(party_id, RoomEvent::chat(message))
    }

    /// Informational notice
    pub fn system(&self, party_id: PartyId, message: impl Into<String>) -> Delivery {
        self.send_live(
            party_id,
            RoomEvent::System {
                message: message.into(),
            },
        )
    }

    /// Active member count taken from the snapshot committed by a mutation.
    /// A snapshot no newer than the last one sent to the room is dropped.
    pub fn count_update(&self, party_id: PartyId, snapshot: &PartySnapshot) -> Delivery {
        let gate = self.gate(party_id);
        let _guard = gate.lock();

        if self.is_terminated(party_id) {
            return Delivery::suppressed();
        }

        match self.count_revisions.entry(party_id) {
            Entry::Occupied(mut last) => {
                if *last.get() >= snapshot.revision {
                    tracing::debug!(
                        %party_id,
                        revision = snapshot.revision,
                        last = *last.get(),
                        "dropping stale count update"
                    );
                    return Delivery::suppressed();
                }
                last.insert(snapshot.revision);
            },
            Entry::Vacant(slot) => {
                slot.insert(snapshot.revision);
            },
        }

        self.fan_out(party_id, RoomEvent::count(snapshot))
    }

    /// Announce that the party is closed. Only the first call for a party
    /// reaches the room; the room is terminal afterwards.
    pub fn party_killed(&self, party_id: PartyId) -> Delivery {
        let gate = self.gate(party_id);
        let _guard = gate.lock();

        if !self.terminated.insert(party_id) {
            return Delivery::suppressed();
        }
        self.count_revisions.remove(&party_id);

        tracing::info!(%party_id, "party killed");
        self.fan_out(party_id, RoomEvent::PartyKilled)
    }

    fn send_live(&self, party_id: PartyId, event: RoomEvent) -> Delivery {
        let gate = self.gate(party_id);
        let _guard = gate.lock();

        if self.is_terminated(party_id) {
            tracing::debug!(%party_id, "dropping event for terminated party");
            return Delivery::suppressed();
        }
        self.fan_out(party_id, event)
    }

    fn gate(&self, party_id: PartyId) -> Arc<Mutex<()>> {
        self.gates.entry(party_id).or_default().value().clone()
    }

    // Caller holds the room gate
    fn fan_out(&self, party_id: PartyId, event: RoomEvent) -> Delivery {
        let event = Arc::new(event);
        let mut delivery = Delivery::default();

        for subscriber in self.registry.members(party_id) {
            let connection_id = subscriber.connection_id;
            let reason = match subscriber.sender.try_send(event.clone()) {
                Ok(()) => {
                    delivery.recipients += 1;
                    continue;
                },
                Err(TrySendError::Full(_)) => "outbound queue full",
                Err(TrySendError::Closed(_)) => "connection closed",
            };

            let err = AppError::DeliveryFailure {
                connection_id,
                reason: reason.to_string(),
            };
            tracing::warn!(%party_id, user = %subscriber.user.id, error = %err, "evicting connection");
            self.registry.evict(party_id, connection_id);
            delivery.failed += 1;
        }

        counter!(BROADCAST_DELIVERED).increment(delivery.recipients as u64);
        if delivery.failed > 0 {
            counter!(BROADCAST_FAILED).increment(delivery.failed as u64);
        }
        delivery
    }
}
