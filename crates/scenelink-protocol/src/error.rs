//! Protocol errors

/// Errors raised while encoding or decoding wire messages
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Text was not valid JSON or did not match the message schema
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
