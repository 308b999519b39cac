use crate::models::User;
use async_trait::async_trait;

/// Resolves an opaque bearer token to the user it was issued to
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<User>;
}
