//! Gateway error types

/// Why a command did not produce a successful result
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// No ack within the timeout window
    #[error("{command_type} timed out after {timeout_ms}ms")]
    Timeout {
        command_type: String,
        timeout_ms: u64,
    },

    /// Sandbox answered with a failure ack
    #[error("{command_type} failed: {message}")]
    Failed {
        command_type: String,
        message: String,
    },

    /// Gateway was destroyed while the command was pending, or before it was sent
    #[error("gateway destroyed")]
    Destroyed,

    /// Message could not be handed to the sandbox
    #[error("transport error: {0}")]
    Transport(String),

    /// Command could not be serialized
    #[error("encoding failed: {0}")]
    Encode(String),
}

impl GatewayError {
    /// Whether another attempt under a new id may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Failed { .. } | Self::Transport(_)
        )
    }

    /// Command type the error refers to, if any
    #[must_use]
    pub fn command_type(&self) -> Option<&str> {
        match self {
            Self::Timeout { command_type, .. } | Self::Failed { command_type, .. } => {
                Some(command_type)
            }
            _ => None,
        }
    }
}
