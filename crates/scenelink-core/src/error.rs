//! Error types for the host session
//!
//! - Configuration loading and validation
//! - Session wiring and teardown
//! - Scene generation
//! - Command scripts

use scenelink_gateway::GatewayError;
use scenelink_geometry::WorkerError;

/// Configuration could not be loaded or is unusable
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Parse(String),

    #[error("failed to render config: {0}")]
    Serialize(String),

    /// Parsed, but rejected by validation
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Scene generator failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    #[error("generator produced no scene for prompt")]
    Empty,
}

/// Command script failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("invalid script: {0}")]
    Parse(String),

    /// Step references an earlier step that produced no object
    #[error("step {step} references {reference}, which has no object id")]
    Reference { step: usize, reference: String },

    #[error("step {step} is not a valid command: {reason}")]
    Command { step: usize, reason: String },
}

/// Main session error type
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("geometry worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("scene generation failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    /// `generate_scene` called on a session without a generator
    #[error("no scene generator attached")]
    NoGenerator,

    /// Sandbox side is gone
    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// Whether the error came from the command path and a resend may help
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(err) if err.is_retryable())
    }
}
