// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const PARTY_CREATED: &str = "party.created";
pub const PARTY_CLOSED: &str = "party.closed";
pub const PARTY_JOINED: &str = "party.joined";
pub const PARTY_LEFT: &str = "party.left";
pub const CHAT_PERSISTED: &str = "chat.persisted";
pub const BROADCAST_DELIVERED: &str = "broadcast.delivered";
pub const BROADCAST_FAILED: &str = "broadcast.failed";
pub const SESSION_CREATED: &str = "session.created";
pub const SESSION_EXPIRED: &str = "session.expired";
pub const SESSION_ACTIVE: &str = "session.active";
