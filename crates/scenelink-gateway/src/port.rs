//! Transport seam between the gateway and the sandbox

use crate::error::GatewayError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Delivers serialized envelopes across the isolation boundary
///
/// Delivery only; replies come back through
/// [`CommandGateway::handle_incoming`](crate::CommandGateway::handle_incoming).
#[async_trait]
pub trait SandboxPort: Send + Sync {
    async fn post(&self, text: String) -> Result<(), GatewayError>;
}

/// Port writing into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelPort {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelPort {
    /// Port plus the receiving end the sandbox side reads from
    #[must_use]
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SandboxPort for ChannelPort {
    async fn post(&self, text: String) -> Result<(), GatewayError> {
        self.tx
            .send(text)
            .map_err(|_| GatewayError::Transport("sandbox channel closed".into()))
    }
}
