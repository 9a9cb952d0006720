//! Error taxonomy shared by the dispatcher, tool handlers and transports.
//!
//! Every variant renders as a human-readable sentence. The dispatcher turns
//! these into `isError` tool results, so nothing here ever reaches the
//! transport as a raw fault.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error(
        "Server configuration is incomplete: no API key is set. Use the config_set tool to configure the API key before calling {operation}."
    )]
    NotConfigured { operation: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A required value was neither supplied nor configured.
    #[error("Missing required field '{field}': provide it as an argument or set it with config_set.")]
    MissingField { field: &'static str },

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Validation error for {operation}: {details}")]
    ValidationError { operation: String, details: String },

    #[error(
        "Loop detected: {operation} has failed {attempts} times in a row. Stop retrying the same call and ask the user for clarification. Recent errors:\n{}",
        format_history(.history)
    )]
    LoopDetected {
        operation: String,
        attempts: u32,
        history: Vec<String>,
    },

    #[error("{0}")]
    HandlerError(String),

    #[error("Failed to acquire an upload location: {0}")]
    UploadLocationError(String),

    #[error("Failed to transfer file bytes (status {status}): {reason}")]
    TransferError { status: u16, reason: String },

    #[error("Failed to register the uploaded file: {0}")]
    MetadataRegistrationError(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Transport error: {0}")]
    TransportError(String),
}

impl ToolError {
    /// Stable identifier for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::NotConfigured { .. } => "NotConfigured",
            ToolError::InvalidConfiguration(_) => "InvalidConfiguration",
            ToolError::MissingField { .. } => "MissingField",
            ToolError::UnknownOperation(_) => "UnknownOperation",
            ToolError::ValidationError { .. } => "ValidationError",
            ToolError::LoopDetected { .. } => "LoopDetected",
            ToolError::HandlerError(_) => "HandlerError",
            ToolError::UploadLocationError(_) => "UploadLocationError",
            ToolError::TransferError { .. } => "TransferError",
            ToolError::MetadataRegistrationError(_) => "MetadataRegistrationError",
            ToolError::SessionNotFound(_) => "SessionNotFound",
            ToolError::TransportError(_) => "TransportError",
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        ToolError::HandlerError(message.into())
    }
}

fn format_history(history: &[String]) -> String {
    history
        .iter()
        .map(|message| format!("- {message}"))
        .collect::<Vec<_>>()
        .join("\n")
}
