//! Error types for FormFlow.

/// Top-level error type for the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Browser driver errors.
///
/// `Init` and `Navigation` are fatal for the automation attempt.
/// `Act` is swallowed per-field during fills. `Extraction` is non-fatal:
/// callers treat it as "no missing fields found" and let the flow fall
/// through toward a submit attempt.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Browser session could not be created: {reason}")]
    Init { reason: String },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Browser action failed: {instruction}: {reason}")]
    Act { instruction: String, reason: String },

    #[error("Structured extraction failed: {reason}")]
    Extraction { reason: String },

    #[error("Screenshot capture failed: {reason}")]
    Screenshot { reason: String },

    #[error("Failed to close browser session: {reason}")]
    Close { reason: String },
}

/// Notification channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Session lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("An automation session is already running for decision {decision_id}")]
    AlreadyRunning { decision_id: String },

    #[error("No actionable link in the email for decision {decision_id}")]
    NoActionableLink { decision_id: String },

    #[error("No active session for decision {decision_id}")]
    Stale { decision_id: String },

    #[error("Invalid status transition for {decision_id}: {from} -> {to}")]
    InvalidTransition {
        decision_id: String,
        from: String,
        to: String,
    },

    #[error("Form submission failed: {reason}")]
    Submission { reason: String },
}

/// Result type alias for the orchestrator.
pub type Result<T> = std::result::Result<T, Error>;
