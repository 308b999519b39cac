// ============================
// partyline-backend/src/auth/mod.rs
// ============================
//! Identity boundary: token issuing, lookup and request extractors.

mod extract;
mod provider;
pub mod session;
pub mod token_generator;

pub use extract::{AuthUser, BearerToken, MaybeUser};
pub use provider::IdentityProvider;
pub use session::{Session, SessionIdentity};
