/// Error types for the Ponder reasoning system.
use std::time::Duration;
use thiserror::Error;

/// Core error type for message bus operations.
#[derive(Error, Debug, Clone)]
pub enum BusError {
    #[error("Request on topic '{topic}' timed out after {timeout:?} (correlation id {correlation_id})")]
    Timeout {
        topic: String,
        correlation_id: String,
        timeout: Duration,
    },

    #[error("{} subscriber(s) failed on topic '{topic}': {}", failures.len(), failures.join("; "))]
    SubscriberFailed { topic: String, failures: Vec<String> },

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Response channel closed: {0}")]
    ChannelClosed(String),
}

/// Result type for message bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Core error type for tree search operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReasoningError {
    #[error("Step generator failed: {0}")]
    Generator(String),

    #[error("Step evaluator failed: {0}")]
    Evaluator(String),

    #[error("Evaluator returned a non-finite score: {0}")]
    InvalidScore(f64),

    #[error("Unknown thought node: {0}")]
    UnknownNode(usize),

    #[error("Search cancelled")]
    Cancelled,
}

/// Result type for tree search operations.
pub type ReasoningResult<T> = Result<T, ReasoningError>;

/// Core error type for collaborating agents.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Reasoning error: {0}")]
    Reasoning(#[from] ReasoningError),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

impl From<AgentError> for BusError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Bus(inner) => inner,
            other => BusError::Handler(other.to_string()),
        }
    }
}

/// Core error type for configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
