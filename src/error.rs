//! Error types for the market research orchestrator

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Failures of the brokerage token lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Brokerage credentials missing: {0}")]
    MissingCredentials(String),

    #[error("Token request failed: {0}")]
    TransportFailure(String),

    #[error("Token request rejected by remote: {0}")]
    RemoteRejected(String),
}

/// Failures of a single remote tool invocation.
///
/// These are carried as values inside `ToolResult::Failure` — they never
/// cross the invoker boundary as a raised error.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ToolError {
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),
}

impl ToolError {
    /// Stable lowercase tag used in error payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::TransportFailure(_) => "transport_failure",
            ToolError::MalformedResponse(_) => "malformed_response",
            ToolError::Timeout(_) => "timeout",
            ToolError::MissingParameter(_) => "missing_parameter",
        }
    }
}

/// Internal routing signal. Never surfaced to callers — the router always
/// resolves to a best-guess domain and logs this as a warning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Query is ambiguous or unclassifiable: {0}")]
    AmbiguousOrUnclassifiable(String),
}

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Routing error: {0}")]
    Router(#[from] RouterError),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("Trend data error: {0}")]
    TrendError(String),

    #[error("Report assembly error: {0}")]
    ReportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
