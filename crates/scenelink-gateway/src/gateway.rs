//! Command gateway
//!
//! Host-side half of the command/ack protocol:
//! - `send` posts a tracked envelope and resolves on its ack, with a timeout
//!   and a bounded number of retries, each under a fresh [`CommandId`]
//! - `send_fire_and_forget` posts an advisory command with no id
//! - `handle_incoming` routes acks by id and forwards everything else
//!
//! Any number of commands can be in flight; only ids correlate replies.

use crate::error::GatewayError;
use crate::port::SandboxPort;
use chrono::Utc;
use dashmap::DashMap;
use scenelink_protocol::{
    AdvisoryCommand, CommandId, CommandResult, Envelope, SandboxCommand, SandboxMessage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::{self, Instant};

const EVENT_CAPACITY: usize = 256;

/// Gateway defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Ack timeout per attempt
    pub timeout: Duration,
    /// Extra attempts after the first
    pub retries: u32,
    /// Pause between a failed attempt and the next
    pub retry_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 0,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Per-send overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub timeout: Duration,
    pub retries: u32,
}

impl SendOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

impl From<GatewayConfig> for SendOptions {
    fn from(config: GatewayConfig) -> Self {
        Self {
            timeout: config.timeout,
            retries: config.retries,
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Ack {
        success: bool,
        error: Option<String>,
        data: Option<serde_json::Value>,
    },
    Destroyed,
}

/// Bookkeeping for one in-flight attempt
#[derive(Debug)]
struct PendingCommand {
    command_type: &'static str,
    attempt: u32,
    created_at: Instant,
    responder: oneshot::Sender<Outcome>,
}

/// Removes an attempt's entry however the attempt ends, dropped futures included
struct PendingGuard<'a> {
    pending: &'a DashMap<CommandId, PendingCommand>,
    id: CommandId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

struct Inner {
    port: Arc<dyn SandboxPort>,
    config: GatewayConfig,
    pending: DashMap<CommandId, PendingCommand>,
    destroyed: watch::Sender<bool>,
    events: broadcast::Sender<SandboxMessage>,
}

/// Host-side command gateway
///
/// Cheap to clone; clones share the pending table.
#[derive(Clone)]
pub struct CommandGateway {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CommandGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGateway")
            .field("config", &self.inner.config)
            .field("pending", &self.inner.pending.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl CommandGateway {
    #[must_use]
    pub fn new(port: Arc<dyn SandboxPort>, config: GatewayConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                port,
                config,
                pending: DashMap::new(),
                destroyed: watch::channel(false).0,
                events,
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Options built from the configured defaults
    #[inline]
    #[must_use]
    pub fn default_options(&self) -> SendOptions {
        self.inner.config.into()
    }

    /// Send a tracked command with the default options
    pub async fn send_default(&self, command: SandboxCommand) -> Result<CommandResult, GatewayError> {
        self.send(command, self.default_options()).await
    }

    /// Send a tracked command and wait for its ack
    ///
    /// A failure ack or an expired timeout consumes one retry, waits the
    /// configured delay and resubmits under a new id; the old id is
    /// forgotten, so a late ack for it is treated as unknown. With
    /// `retries = N` a silent sandbox is given exactly N+1 windows.
    pub async fn send(
        &self,
        command: SandboxCommand,
        options: SendOptions,
    ) -> Result<CommandResult, GatewayError> {
        let command_type = command.command_type();
        let mut retries_left = options.retries;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self
                .attempt(&command, command_type, attempt, options.timeout)
                .await
            {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() && retries_left > 0 => err,
                Err(err) => {
                    tracing::debug!(command_type, attempt, error = %err, "command rejected");
                    return Err(err);
                }
            };

            retries_left -= 1;
            tracing::warn!(command_type, attempt, retries_left, error = %err, "retrying command");
            tokio::select! {
                biased;
                () = self.destroyed() => return Err(GatewayError::Destroyed),
                () = time::sleep(self.inner.config.retry_delay) => {}
            }
        }
    }

    async fn attempt(
        &self,
        command: &SandboxCommand,
        command_type: &'static str,
        attempt: u32,
        timeout: Duration,
    ) -> Result<CommandResult, GatewayError> {
        if self.is_destroyed() {
            return Err(GatewayError::Destroyed);
        }

        let command_id = CommandId::new();
        let text = Envelope::tracked(command_id, command.clone())
            .encode()
            .map_err(|e| GatewayError::Encode(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(
            command_id,
            PendingCommand {
                command_type,
                attempt,
                created_at: Instant::now(),
                responder: tx,
            },
        );
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            id: command_id,
        };
        // destroy() may have drained the table between the check and the insert
        if self.is_destroyed() {
            return Err(GatewayError::Destroyed);
        }

        tracing::debug!(%command_id, command_type, attempt, "posting command");
        // The window covers delivery too: a stalled port times out like a silent sandbox
        let exchange = async {
            self.inner.port.post(text).await?;
            Ok::<_, GatewayError>(rx.await)
        };
        let outcome = tokio::select! {
            biased;
            () = self.destroyed() => return Err(GatewayError::Destroyed),
            outcome = time::timeout(timeout, exchange) => outcome,
        };

        match outcome {
            Ok(Err(err)) => Err(err),
            Ok(Ok(Ok(Outcome::Ack {
                success: true,
                data,
                ..
            }))) => Ok(CommandResult {
                command_id,
                command_type: command_type.to_owned(),
                success: true,
                data,
                error: None,
                timestamp: Utc::now(),
            }),
            Ok(Ok(Ok(Outcome::Ack { error, .. }))) => Err(GatewayError::Failed {
                command_type: command_type.to_owned(),
                message: error.unwrap_or_else(|| "command failed".to_owned()),
            }),
            Ok(Ok(Ok(Outcome::Destroyed) | Err(_))) => Err(GatewayError::Destroyed),
            Err(_) => Err(GatewayError::Timeout {
                command_type: command_type.to_owned(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Post an advisory command without tracking
    ///
    /// Only the advisory subset can be sent this way; no ack is awaited and
    /// loss is acceptable.
    pub async fn send_fire_and_forget(&self, command: AdvisoryCommand) -> Result<(), GatewayError> {
        if self.is_destroyed() {
            return Err(GatewayError::Destroyed);
        }
        let command: SandboxCommand = command.into();
        tracing::trace!(command_type = command.command_type(), "posting advisory command");
        let text = Envelope::untracked(command)
            .encode()
            .map_err(|e| GatewayError::Encode(e.to_string()))?;
        tokio::select! {
            biased;
            () = self.destroyed() => Err(GatewayError::Destroyed),
            posted = self.inner.port.post(text) => posted,
        }
    }

    /// Route one sandbox -> host message
    ///
    /// Acks resolve their pending command; acks for unknown or stale ids are
    /// logged and dropped. Every other message is published to subscribers
    /// and returned. Malformed text is logged and dropped.
    pub fn handle_incoming(&self, raw: &str) -> Option<SandboxMessage> {
        let message = match SandboxMessage::decode(raw) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "malformed sandbox message dropped");
                return None;
            }
        };

        match message {
            SandboxMessage::CommandAck {
                command_id,
                success,
                error,
                data,
            } => {
                match self.inner.pending.remove(&command_id) {
                    Some((_, pending)) => {
                        tracing::debug!(
                            %command_id,
                            command_type = pending.command_type,
                            attempt = pending.attempt,
                            success,
                            elapsed_ms = u64::try_from(pending.created_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                            "ack received"
                        );
                        // Sender may have stopped waiting
                        let _ = pending.responder.send(Outcome::Ack {
                            success,
                            error,
                            data,
                        });
                    }
                    None => tracing::warn!(%command_id, success, "ack for unknown command dropped"),
                }
                None
            }
            other => {
                // No subscribers is fine
                let _ = self.inner.events.send(other.clone());
                Some(other)
            }
        }
    }

    /// Untracked sandbox messages, as they arrive
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SandboxMessage> {
        self.inner.events.subscribe()
    }

    /// Number of commands awaiting an ack
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    #[inline]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        *self.inner.destroyed.borrow()
    }

    /// Resolves once [`destroy`](Self::destroy) has run
    async fn destroyed(&self) {
        let mut rx = self.inner.destroyed.subscribe();
        // Inner owns the sender, so the channel cannot close under us
        let _ = rx.wait_for(|destroyed| *destroyed).await;
    }

    /// Reject every pending command and refuse new ones
    ///
    /// Sends still waiting on delivery or on a retry delay are released too.
    pub fn destroy(&self) {
        if self.inner.destroyed.send_replace(true) {
            return;
        }
        let ids: Vec<CommandId> = self.inner.pending.iter().map(|e| *e.key()).collect();
        let mut rejected = 0usize;
        for id in ids {
            if let Some((_, pending)) = self.inner.pending.remove(&id) {
                let _ = pending.responder.send(Outcome::Destroyed);
                rejected += 1;
            }
        }
        tracing::info!(rejected, "command gateway destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ChannelPort;
    use scenelink_protocol::PrimitiveKind;

    fn gateway() -> (CommandGateway, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (port, rx) = ChannelPort::pair();
        (CommandGateway::new(Arc::new(port), GatewayConfig::default()), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn pending_entry_removed_after_timeout() {
        let (gateway, _rx) = gateway();
        let options = gateway
            .default_options()
            .with_timeout(Duration::from_millis(10));

        let err = gateway
            .send(SandboxCommand::ClearScene, options)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert_eq!(gateway.pending_count(), 0);
    }

    #[tokio::test]
    async fn malformed_text_is_dropped() {
        let (gateway, _rx) = gateway();
        assert!(gateway.handle_incoming("{not json").is_none());
        assert!(gateway.handle_incoming(r#"{"type":"nope"}"#).is_none());
    }

    #[tokio::test]
    async fn advisory_envelope_has_no_id() {
        let (gateway, mut rx) = gateway();
        gateway
            .send_fire_and_forget(AdvisoryCommand::ToggleGrid { visible: true })
            .await
            .unwrap();

        let text = rx.recv().await.unwrap();
        let envelope = Envelope::decode(&text).unwrap();
        assert_eq!(envelope.command_id, None);
        assert_eq!(envelope.command.command_type(), "toggleGrid");
        assert_eq!(gateway.pending_count(), 0);
    }

    #[tokio::test]
    async fn closed_transport_fails_send() {
        let (gateway, rx) = gateway();
        drop(rx);
        let err = gateway
            .send_default(SandboxCommand::add_primitive(PrimitiveKind::Box))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
        assert_eq!(gateway.pending_count(), 0);
    }
}
