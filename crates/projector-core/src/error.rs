//! Error types for the projector driver

use crate::registry::StatusCode;
use sdcp_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while executing a hub command
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Caller supplied an invalid parameter
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown logical command
    #[error("Command not implemented: {0}")]
    NotImplemented(String),

    /// Setup has not produced a usable projector address yet
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Transport failure or device rejection
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl DispatchError {
    /// Hub status code for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::BadRequest(_) => StatusCode::BadRequest,
            DispatchError::NotImplemented(_) => StatusCode::NotImplemented,
            DispatchError::NotConfigured(_) => StatusCode::Conflict,
            DispatchError::Protocol(_) => StatusCode::ServerError,
        }
    }
}

/// Errors raised by the runtime configuration store
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error (persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Setup failures as reported to the hub
#[derive(Error, Debug)]
pub enum SetupError {
    /// Address invalid or projector could not be identified
    #[error("Not found: {0}")]
    NotFound(String),

    /// No advertisement within the discovery window
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Port closed or command round trip rejected
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Setup failed: {0}")]
    Other(String),
}

impl From<ConfigError> for SetupError {
    fn from(err: ConfigError) -> Self {
        SetupError::Other(err.to_string())
    }
}
