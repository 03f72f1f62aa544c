//! Error types for veracity-core.

use thiserror::Error;

/// Result type alias using veracity-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during claim-audit operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller-supplied input is invalid (empty question, malformed history,
    /// missing agent input key)
    #[error("Bad input: {0}")]
    BadInput(String),

    /// An agent has no prompt row in the store
    #[error("Missing prompt configuration for agent '{agent}'")]
    ConfigMissing { agent: String },

    /// LLM provider transport or quota error
    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    /// LLM returned content that could not be parsed as the expected
    /// structured output
    #[error("Invalid structured output: {0}")]
    InvalidOutput(String),

    /// A router/gateway tool raised during resolution
    #[error("Tool '{name}' failed: {message}")]
    Tool { name: String, message: String },

    /// Embedding provider failure (recoverable, transport-level)
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Claim store / persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Entity lookup failed
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Concurrent mutation conflict (e.g. reset racing a write)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Cooperative cancellation was observed
    #[error("Cancelled")]
    Cancelled,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a bad-input error.
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput(message.into())
    }

    /// Create a missing-config error for an agent.
    pub fn config_missing(agent: impl Into<String>) -> Self {
        Self::ConfigMissing {
            agent: agent.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-structured-output error.
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Create a tool failure error.
    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Whether this error came from the LLM layer (provider transport,
    /// unparseable output, or a tool raise). The router degrades to
    /// NOVEL_CLAIM on these instead of surfacing them.
    pub fn is_llm_fault(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. } | Self::InvalidOutput(_) | Self::Tool { .. } | Self::Timeout { .. }
        )
    }
}
