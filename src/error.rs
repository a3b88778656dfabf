//! Error types for GTD Assist.

use crate::conversation::model::MessageId;
use crate::conversation::suggestion::SuggestionState;

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    #[error("Input rejected: {0}")]
    Input(#[from] InputRejected),

    #[error("Suggestion error: {0}")]
    Lifecycle(#[from] LifecycleError),

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
}

/// Suggestion / review generation failures.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Geolocation capture failures.
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("Location unavailable: {0}")]
    Unavailable(String),

    #[error("Location access denied by the platform")]
    Denied,
}

/// User input the engine refused to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputRejected {
    #[error("input is blank")]
    Blank,

    #[error("another request is already in flight")]
    Busy,

    #[error("session is closed")]
    Closed,
}

/// Invalid suggestion lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("No suggestion attached to message {0}")]
    UnknownSuggestion(MessageId),

    #[error("Suggestion {id} already {state}")]
    AlreadyResolved { id: MessageId, state: SuggestionState },

    #[error("A suggestion can't be resolved to {0}")]
    InvalidTarget(SuggestionState),

    #[error("Session is closed")]
    Closed,
}

/// Session-level errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Onboarding already ran for this session")]
    AlreadyBootstrapped,

    #[error("Session is closed")]
    Closed,
}

/// Result type alias for the assistant.
pub type Result<T> = std::result::Result<T, Error>;
