// ================
// crates/backend-lib/src/models.rs
// ================
//! Durable party, membership and chat records.
use chrono::{DateTime, Utc};
use partyline_common::{
    ChatLine, MembershipSummary, PartyId, PartySpec, PartyStatus, PartySummary, UserId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated user, as handed over by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub nickname: String,
}

impl User {
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            nickname: nickname.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub host_id: UserId,
    pub host_name: String,
    /// Opaque catalog reference, never interpreted here
    pub activity: String,
    pub mode: String,
    pub description: String,
    pub max_members: u32,
    pub mic_required: bool,
    pub status: PartyStatus,
    pub created_at: DateTime<Utc>,
}

/// A (party, user) row. Leaving flips `is_active`; the row itself is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyMember {
    pub user_id: UserId,
    pub nickname: String,
    pub is_active: bool,
    /// Set on first join only
    pub joined_at: DateTime<Utc>,
}

/// A party together with all of its membership rows.
///
/// This is the unit the store locks, persists and replaces, so status and
/// member count are always read from the same write generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyRecord {
    pub party: Party,
    pub members: Vec<PartyMember>,
    /// Bumped by every committed mutation
    pub revision: u64,
}

impl PartyRecord {
    /// A fresh open party with the host seeded as its first active member
    pub fn open(host: &User, spec: PartySpec) -> Self {
        let now = Utc::now();
        let party = Party {
            id: Uuid::new_v4(),
            host_id: host.id,
            host_name: host.nickname.clone(),
            activity: spec.activity.trim().to_string(),
            mode: spec.mode.trim().to_string(),
            description: spec.description.trim().to_string(),
            max_members: spec.max_members,
            mic_required: spec.mic_required,
            status: PartyStatus::Open,
            created_at: now,
        };
        let host_member = PartyMember {
            user_id: host.id,
            nickname: host.nickname.clone(),
            is_active: true,
            joined_at: now,
        };

        Self {
            party,
            members: vec![host_member],
            revision: 1,
        }
    }

    pub fn id(&self) -> PartyId {
        self.party.id
    }

    pub fn is_open(&self) -> bool {
        self.party.status.is_open()
    }

    pub fn is_host(&self, user_id: UserId) -> bool {
        self.party.host_id == user_id
    }

    pub fn active_count(&self) -> u32 {
        self.members.iter().filter(|m| m.is_active).count() as u32
    }

    pub fn has_room(&self) -> bool {
        self.active_count() < self.party.max_members
    }

    pub fn member(&self, user_id: UserId) -> Option<&PartyMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn member_mut(&mut self, user_id: UserId) -> Option<&mut PartyMember> {
        self.members.iter_mut().find(|m| m.user_id == user_id)
    }

    pub fn is_active_member(&self, user_id: UserId) -> bool {
        self.member(user_id).is_some_and(|m| m.is_active)
    }

    /// Point-in-time state for one viewer
    pub fn snapshot(&self, viewer: Option<UserId>) -> PartySnapshot {
        PartySnapshot {
            party_id: self.party.id,
            status: self.party.status,
            current_member_count: self.active_count(),
            max_members: self.party.max_members,
            is_member: viewer.is_some_and(|id| self.is_active_member(id)),
            is_host: viewer.is_some_and(|id| self.is_host(id)),
            revision: self.revision,
        }
    }

    pub fn summary(&self) -> PartySummary {
        let party = &self.party;
        PartySummary {
            id: party.id,
            host_id: party.host_id,
            host_name: party.host_name.clone(),
            activity: party.activity.clone(),
            mode: party.mode.clone(),
            description: party.description.clone(),
            max_members: party.max_members,
            current_member_count: self.active_count(),
            mic_required: party.mic_required,
            status: party.status,
            created_at: party.created_at,
        }
    }

    pub fn membership_summary(&self, member: &PartyMember) -> MembershipSummary {
        MembershipSummary {
            party_id: self.party.id,
            activity: self.party.activity.clone(),
            mode: self.party.mode.clone(),
            status: self.party.status,
            is_active: member.is_active,
            joined_at: member.joined_at,
        }
    }
}

/// Status and count of a party, read under a single lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartySnapshot {
    pub party_id: PartyId,
    pub status: PartyStatus,
    pub current_member_count: u32,
    pub max_members: u32,
    pub is_member: bool,
    pub is_host: bool,
    pub revision: u64,
}

/// A persisted chat message. `seq` is the per-party arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub party_id: PartyId,
    pub seq: u64,
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn to_line(&self) -> ChatLine {
        ChatLine {
            sender: self.author_name.clone(),
            sender_id: self.author_id,
            message: self.content.clone(),
            created_at: self.created_at,
        }
    }
}
