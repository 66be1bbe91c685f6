//! Error types for the gateway bridge.
//!
//! Each variant maps to a stable `errorType` when it has to be reported to the
//! Lambda host as a [`Diagnostic`].

use lambda_runtime::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The event matched no known shape, or lacks fields its shape requires.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A response header repeats more often than its name has case variants.
    #[error(
        "Too many duplicate headers: {values} values for `{name}` but only {available} case variants"
    )]
    TooManyDuplicateHeaders {
        name: String,
        values: usize,
        available: u64,
    },

    /// Lambda-integration requests cannot carry a status code, so an
    /// unsuccessful response travels as an error whose message is the
    /// serialized response.
    #[error("{payload}")]
    LambdaIntegrationStatus { status: u16, payload: String },

    #[error("Application error: {0:#}")]
    Application(anyhow::Error),

    #[error("Unable to import {path}: {reason}")]
    AppLoad { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// The `errorType` reported to the Lambda host.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::MalformedEvent(_) => "MalformedEvent",
            Self::InvalidJson(_) => "InvalidJson",
            Self::Base64(_) => "InvalidBody",
            Self::TooManyDuplicateHeaders { .. } => "TooManyDuplicateHeaders",
            Self::LambdaIntegrationStatus { .. } => "LambdaIntegrationError",
            Self::Application(_) => "ApplicationError",
            Self::AppLoad { .. } => "AppLoadError",
            Self::Config(_) => "ConfigError",
        }
    }
}

impl From<BridgeError> for Diagnostic {
    fn from(error: BridgeError) -> Self {
        Self {
            error_type: error.error_type().to_string(),
            error_message: error.to_string(),
        }
    }
}
