// ============================
// partyline-backend/src/handlers/mod.rs
// ============================
//! HTTP handlers for the party management surface.

pub mod parties;
pub mod session;

use crate::AppState;
use axum::Router;
use std::sync::Arc;

/// Request/response routes, without the room connection
pub fn router() -> Router<Arc<AppState>> {
    parties::router().merge(session::router())
}
