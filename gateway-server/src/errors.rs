//! HTTP error mapping (spec.md §7 "Error Handling Design") — every non-200
//! response carries a human-readable `error` field, with a `type`
//! discriminator for errors that trace back to a typed core error.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gateway_core::error::{GatewayError, SchedulerError, SpeedtestError, StorageError};
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub kind: Option<&'static str>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), kind: None }
    }

    pub fn with_kind(status: StatusCode, message: impl Into<String>, kind: &'static str) -> Self {
        Self { status, message: message.into(), kind: Some(kind) }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.kind {
            Some(kind) => json!({ "error": self.message, "type": kind }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "storage operation failed");
        let kind = match &err {
            StorageError::InsertFailed(_) => "insert_failed",
            StorageError::QueryFailed(_) => "query_failed",
            StorageError::ParseRow(_) => "parse_row",
            StorageError::Sqlx(_) => "query_failed",
        };
        Self::with_kind(StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), kind)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let kind = err.kind();
        let status = match &err {
            GatewayError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Parse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::with_kind(status, err.to_string(), kind)
    }
}

impl From<SpeedtestError> for ApiError {
    fn from(err: SpeedtestError) -> Self {
        match err {
            SpeedtestError::NoTool => Self::with_kind(StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), "no_tool"),
            SpeedtestError::Busy => Self::with_kind(StatusCode::CONFLICT, err.to_string(), "busy"),
            SpeedtestError::Storage(storage) => storage.into(),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::AlreadyRunning => Self::with_kind(StatusCode::CONFLICT, err.to_string(), "already_running"),
            SchedulerError::NotRunning => Self::with_kind(StatusCode::CONFLICT, err.to_string(), "not_running"),
            SchedulerError::Config(_) => Self::with_kind(StatusCode::BAD_REQUEST, err.to_string(), "config"),
        }
    }
}
