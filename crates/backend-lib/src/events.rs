// ================
// crates/backend-lib/src/events.rs
// ================
//! Events delivered to the connections of a room.
use crate::models::{ChatMessage, PartySnapshot};
use partyline_common::{ServerEvent, UserId};

/// One event fanned out to a room. Cloned behind an `Arc` per recipient.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Chat {
        /// Position in the party's chat log
        seq: u64,
        sender_id: UserId,
        sender: String,
        message: String,
    },
    System {
        message: String,
    },
    CountUpdate {
        count: u32,
        max_members: u32,
        /// Party revision the count was read at; not sent on the wire
        revision: u64,
    },
    PartyKilled,
}

impl RoomEvent {
    pub fn chat(message: &ChatMessage) -> Self {
        RoomEvent::Chat {
            seq: message.seq,
            sender_id: message.author_id,
            sender: message.author_name.clone(),
            message: message.content.clone(),
        }
    }

    pub fn count(snapshot: &PartySnapshot) -> Self {
        RoomEvent::CountUpdate {
            count: snapshot.current_member_count,
            max_members: snapshot.max_members,
            revision: snapshot.revision,
        }
    }

    /// The envelope written to the socket
    pub fn to_wire(&self) -> ServerEvent {
        match self {
            RoomEvent::Chat {
                sender_id,
                sender,
                message,
                ..
            } => ServerEvent::ChatMessage {
                message: message.clone(),
                sender: sender.clone(),
                sender_id: *sender_id,
            },
            RoomEvent::System { message } => ServerEvent::SystemMessage {
                message: message.clone(),
            },
            RoomEvent::CountUpdate { count, max_members, .. } => ServerEvent::CountUpdate {
                count: *count,
                max_members: *max_members,
            },
            RoomEvent::PartyKilled => ServerEvent::PartyKilled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RoomEvent::PartyKilled)
    }
}
