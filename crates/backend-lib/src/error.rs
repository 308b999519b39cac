// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::validation::ValidationError;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Host already has a party that is not closed")]
    AlreadyHosting,

    #[error("Party is closed")]
    PartyClosed,

    #[error("Party is full")]
    PartyFull,

    #[error("Party not found")]
    UnknownParty,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Only the host may do this")]
    NotHost,

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Delivery to connection {connection_id} failed: {reason}")]
    DeliveryFailure { connection_id: u64, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::NotHost => StatusCode::FORBIDDEN,
            AppError::UnknownParty => StatusCode::NOT_FOUND,
            AppError::AlreadyHosting | AppError::PartyClosed | AppError::PartyFull => {
                StatusCode::CONFLICT
            },
            AppError::InvalidInput(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::PersistenceFailure(_)
            | AppError::DeliveryFailure { .. }
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::AlreadyHosting => "PARTY_001",
            AppError::PartyClosed => "PARTY_002",
            AppError::PartyFull => "PARTY_003",
            AppError::UnknownParty => "PARTY_004",
            AppError::NotHost => "PARTY_005",
            AppError::Unauthenticated => "AUTH_001",
            AppError::PersistenceFailure(_) => "STORE_001",
            AppError::DeliveryFailure { .. } => "ROOM_001",
            AppError::InvalidInput(_) => "VAL_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::AlreadyHosting => "You already host a party that is still open".to_string(),
            AppError::PartyClosed => "This party has been closed".to_string(),
            AppError::PartyFull => "This party is full".to_string(),
            AppError::UnknownParty => "Party not found".to_string(),
            AppError::NotHost => "Only the host can do that".to_string(),
            AppError::Unauthenticated => "Authentication required".to_string(),
            AppError::InvalidInput(e) => e.to_string(),
            AppError::Json(_) => "Invalid request format".to_string(),
            AppError::PersistenceFailure(_)
            | AppError::DeliveryFailure { .. }
            | AppError::Io(_)
            | AppError::Internal(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
