// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between partyline clients and the server.
//! This module defines the room WebSocket protocol and the payloads of the
//! party management endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a party (and of its chat room)
pub type PartyId = Uuid;

/// Identifier of a user, as supplied by the identity provider
pub type UserId = Uuid;

/// Lifecycle state of a party. Moves from `Open` to `Closed` and never back.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartyStatus {
    Open,
    Closed,
}

impl PartyStatus {
    pub fn is_open(self) -> bool {
        self == PartyStatus::Open
    }
}

/// Frame sent by a client over a room connection
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientFrame {
    /// Chat text to post to the room
    pub message: String,
}

/// Events pushed from the server to every connection in a room
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A persisted chat message
    /// # Fields
    /// * `message` - Message text
    /// * `sender` - Display name of the author
    /// * `sender_id` - User id of the author
    ChatMessage {
        message: String,
        sender: String,
        sender_id: UserId,
    },
    /// Informational notice, never a state transition
    SystemMessage { message: String },
    /// Active member count after a membership change
    CountUpdate { count: u32, max_members: u32 },
    /// The party was closed by its host; no further events follow
    PartyKilled,
}

/// Parameters for creating a party
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PartySpec {
    /// Opaque catalog reference of the activity (game) being played
    pub activity: String,
    /// Free-form mode label (ranked, casual, ...)
    pub mode: String,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    /// Capacity, host included
    pub max_members: u32,
    /// Whether members are expected to use a microphone
    #[serde(default)]
    pub mic_required: bool,
}

/// Public view of a party
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PartySummary {
    pub id: PartyId,
    pub host_id: UserId,
    pub host_name: String,
    pub activity: String,
    pub mode: String,
    pub description: String,
    pub max_members: u32,
    pub current_member_count: u32,
    pub mic_required: bool,
    pub status: PartyStatus,
    pub created_at: DateTime<Utc>,
}

/// One line of chat history as shown in the detail view
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatLine {
    pub sender: String,
    pub sender_id: UserId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Detail view of a party for a given viewer
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PartyDetail {
    pub party: PartySummary,
    pub is_member: bool,
    pub is_host: bool,
    /// Most recent messages, oldest first. Empty for anonymous viewers.
    pub history: Vec<ChatLine>,
}

/// How a join affected the caller's membership row
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MembershipChange {
    /// First time this user joined the party
    Created,
    /// An inactive row was made active again
    Reactivated,
    /// The user already occupied a slot; nothing changed
    AlreadyActive,
}

/// What a leave request did
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeaveOutcome {
    /// The host left and the party is now closed
    Closed,
    /// The host left a party that was already closed
    AlreadyClosed,
    /// A member gave up their slot
    Deactivated,
    /// The caller held no active slot
    NotActive,
}

/// Response to a join request
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JoinResponse {
    pub party_id: PartyId,
    pub change: MembershipChange,
    pub current_member_count: u32,
}

/// Response to a leave request
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LeaveResponse {
    pub party_id: PartyId,
    pub outcome: LeaveOutcome,
}

/// One of the caller's memberships, for the profile view
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MembershipSummary {
    pub party_id: PartyId,
    pub activity: String,
    pub mode: String,
    pub status: PartyStatus,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
}

/// Host notice posted to a room
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NoticeRequest {
    pub message: String,
}

/// Request for a new identity token
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionRequest {
    pub nickname: String,
}

/// Issued identity token
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionResponse {
    pub token: String,
    pub user_id: UserId,
    pub nickname: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_message_envelope() {
        let sender_id = Uuid::new_v4();
        let event = ServerEvent::ChatMessage {
            message: "hi".to_string(),
            sender: "alice".to_string(),
            sender_id,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "chat_message",
                "message": "hi",
                "sender": "alice",
                "sender_id": sender_id,
            })
        );
    }

    #[test]
    fn test_party_killed_has_no_payload() {
        let value = serde_json::to_value(ServerEvent::PartyKilled).unwrap();
        assert_eq!(value, json!({ "type": "party_killed" }));
    }

    #[test]
    fn test_count_update_envelope() {
        let value = serde_json::to_value(ServerEvent::CountUpdate {
            count: 3,
            max_members: 4,
        })
        .unwrap();
        assert_eq!(value["type"], "count_update");
        assert_eq!(value["count"], 3);
        assert_eq!(value["max_members"], 4);
    }

    #[test]
    fn test_client_frame_ignores_unknown_fields() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"message":"hello","extra":true}"#).unwrap();
        assert_eq!(frame.message, "hello");
    }

    #[test]
    fn test_client_frame_requires_message() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"text":"hello"}"#).is_err());
    }

    #[test]
    fn test_party_spec_defaults() {
        let spec: PartySpec = serde_json::from_str(
            r#"{"activity":"league","mode":"ranked","max_members":5}"#,
        )
        .unwrap();
        assert_eq!(spec.description, "");
        assert!(!spec.mic_required);
    }
}
