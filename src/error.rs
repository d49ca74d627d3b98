use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::protocol::{CLOSE_INTERNAL_ERROR, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION};

/// Application-wide error type (HTTP surface)
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Error response body (unified success format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        // Always return 200 OK - success/failure is indicated by the success field
        StatusCode::OK
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        tracing::error!(
            error_type = std::any::type_name_of_val(&self),
            error_message = %body.message,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

/// Relay session errors
///
/// Every variant is terminal to the session it occurs in. Decoder-side
/// failures live in [`crate::player::BufferError`] and never end a session.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("streamUrl query parameter required")]
    MissingSourceDescriptor,

    #[error("Invalid streamUrl: {0}")]
    InvalidSourceDescriptor(String),

    #[error("Failed to start transcoder {binary}: {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcoder produced no output within {0:?}")]
    StartupTimeout(Duration),

    #[error("Upstream terminated: {0}")]
    UpstreamTerminated(String),

    #[error("Transport write failed: {0}")]
    TransportWrite(String),
}

impl RelayError {
    /// WebSocket close code reported to the client for this error
    pub fn close_code(&self) -> u16 {
        match self {
            Self::MissingSourceDescriptor | Self::InvalidSourceDescriptor(_) => {
                CLOSE_POLICY_VIOLATION
            }
            Self::Launch { .. } | Self::StartupTimeout(_) | Self::TransportWrite(_) => {
                CLOSE_INTERNAL_ERROR
            }
            Self::UpstreamTerminated(_) => CLOSE_NORMAL,
        }
    }

    /// Short machine-readable kind, used in events and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingSourceDescriptor => "missing_source_descriptor",
            Self::InvalidSourceDescriptor(_) => "invalid_source_descriptor",
            Self::Launch { .. } => "launch_error",
            Self::StartupTimeout(_) => "startup_timeout",
            Self::UpstreamTerminated(_) => "upstream_terminated",
            Self::TransportWrite(_) => "transport_write_failure",
        }
    }
}
