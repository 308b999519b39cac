// ============================
// partyline-backend/src/auth/extract.rs
// ============================
//! Axum extractors resolving the caller's identity.
//!
//! The token is read from `Authorization: Bearer <token>`, falling back to a
//! `token` query parameter since browsers cannot set headers on a WebSocket
//! upgrade.
use crate::error::AppError;
use crate::models::User;
use crate::AppState;
use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;
use std::sync::Arc;

/// An authenticated caller. Rejects with `Unauthenticated` otherwise.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// The caller's identity when one was presented and is valid
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// The raw token the caller presented, whether or not it is still valid
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn presented_token(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(query)| query.token)
    })
}

async fn resolve(parts: &Parts, state: &AppState) -> Option<User> {
    let token = presented_token(parts)?;
    if token.is_empty() {
        return None;
    }
    state.identity.resolve(&token).await
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
            .await
            .map(AuthUser)
            .ok_or(AppError::Unauthenticated)
    }
}

impl FromRequestParts<Arc<AppState>> for BearerToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        presented_token(parts)
            .filter(|token| !token.is_empty())
            .map(BearerToken)
            .ok_or(AppError::Unauthenticated)
    }
}

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(resolve(parts, state).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, bearer: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_header_takes_precedence() {
        let parts = parts("/parties/x/ws?token=from-query", Some("from-header"));
        assert_eq!(presented_token(&parts).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_query_fallback() {
        let parts = parts("/parties/x/ws?token=from-query", None);
        assert_eq!(presented_token(&parts).as_deref(), Some("from-query"));
    }

    #[test]
    fn test_no_token() {
        assert_eq!(presented_token(&parts("/parties", None)), None);
    }
}
