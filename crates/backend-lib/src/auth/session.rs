// ============================
// partyline-backend/src/auth/session.rs
// ============================
//! In-memory identity tokens with expiry.
use super::provider::IdentityProvider;
use super::token_generator::generate_token;
use crate::error::AppError;
use crate::metrics::{SESSION_ACTIVE, SESSION_CREATED, SESSION_EXPIRED};
use crate::models::User;
use crate::validation::validate_nickname;
use async_trait::async_trait;
use metrics::{counter, gauge};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::{sync::RwLock, task::JoinHandle};

/// How often expired tokens are swept
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Session information
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

impl Session {
    fn is_live(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }
}

/// Token table backing the default identity provider
#[derive(Clone)]
pub struct SessionIdentity {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionIdentity {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Issue a token for a new user identity
    pub async fn issue(&self, nickname: &str) -> Result<(String, User), AppError> {
        let user = User::new(validate_nickname(nickname)?);
        let token = generate_token();
        let now = SystemTime::now();
        let session = Session {
            user: user.clone(),
            created_at: now,
            expires_at: now + self.ttl,
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(token.clone(), session);

        counter!(SESSION_CREATED).increment(1);
        gauge!(SESSION_ACTIVE).set(sessions.len() as f64);
        tracing::info!(user = %user.id, nickname = %user.nickname, "identity issued");

        Ok((token, user))
    }

    /// Get a live session by token
    pub async fn get(&self, token: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|session| session.is_live(SystemTime::now()))
            .cloned()
    }

    /// Invalidate a token. Returns whether it existed.
    pub async fn revoke(&self, token: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.remove(token) else {
            return false;
        };

        gauge!(SESSION_ACTIVE).set(sessions.len() as f64);
        let age = SystemTime::now()
            .duration_since(session.created_at)
            .unwrap_or_default();
        tracing::info!(user = %session.user.id, age_secs = age.as_secs(), "identity revoked");
        true
    }

    /// Drop expired sessions, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = SystemTime::now();
        let before = sessions.len();

        sessions.retain(|_, session| session.is_live(now));

        let removed = before - sessions.len();
        if removed > 0 {
            counter!(SESSION_EXPIRED).increment(removed as u64);
            gauge!(SESSION_ACTIVE).set(sessions.len() as f64);
            tracing::debug!(removed, "expired sessions purged");
        }
        removed
    }

    /// Periodically purge expired sessions until the runtime shuts down
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let identity = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                identity.purge_expired().await;
            }
        })
    }
}

#[async_trait]
impl IdentityProvider for SessionIdentity {
    async fn resolve(&self, token: &str) -> Option<User> {
        self.get(token).await.map(|session| session.user)
    }
}
