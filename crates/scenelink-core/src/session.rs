//! Host session
//!
//! Owns one complete bridge: the geometry worker thread, the sandbox runtime,
//! the command gateway and the pump that feeds sandbox replies back through
//! the gateway into the [`SceneMirror`]. Nothing here is global; two sessions
//! share no state.

use crate::config::BridgeConfig;
use crate::error::SessionError;
use crate::generator::SceneGenerator;
use crate::mirror::{self, MirrorWriter, SceneMirror};
use async_trait::async_trait;
use scenelink_gateway::{CommandGateway, GatewayError, SandboxPort, SendOptions};
use scenelink_geometry::{GeometryWorker, WorkerClient};
use scenelink_protocol::{AdvisoryCommand, CommandResult, ObjectId, SandboxCommand, SandboxMessage};
use scenelink_sandbox::{BooleanEvaluator, SandboxHandle, SandboxRuntime, SandboxSender};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// [`SandboxPort`] over an in-process sandbox runtime
#[derive(Debug, Clone)]
pub struct RuntimePort {
    sender: SandboxSender,
}

impl RuntimePort {
    #[must_use]
    pub fn new(sender: SandboxSender) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl SandboxPort for RuntimePort {
    async fn post(&self, text: String) -> Result<(), GatewayError> {
        self.sender
            .post(text)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}

/// One connected host/sandbox pair
pub struct Session {
    gateway: CommandGateway,
    sandbox: SandboxHandle,
    worker: GeometryWorker,
    pump: JoinHandle<()>,
    mirror: SceneMirror,
    generator: Option<Arc<dyn SceneGenerator>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("gateway", &self.gateway)
            .field("sandbox_running", &self.sandbox.is_running())
            .field("objects", &self.mirror.len())
            .field("generator", &self.generator.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Validate `config`, then start the worker, the sandbox and the pump
    ///
    /// Must be called within a tokio runtime.
    pub fn connect(
        config: &BridgeConfig,
        evaluator: Arc<dyn BooleanEvaluator>,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let (worker, responses) = GeometryWorker::spawn()?;
        let client = WorkerClient::connect(&worker, responses);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let sandbox = SandboxRuntime::builder(config.sandbox_config())
            .evaluator(evaluator)
            .spawn(client, outbound_tx);

        let port = RuntimePort::new(sandbox.sender());
        let gateway = CommandGateway::new(Arc::new(port), config.gateway_config());

        let (writer, mirror) = mirror::mirror();
        let pump = tokio::spawn(pump(gateway.clone(), writer, outbound_rx));

        tracing::info!(
            timeout_ms = config.gateway.timeout_ms,
            retries = config.gateway.retries,
            lod_threshold = config.lod.vertex_threshold,
            "session connected"
        );
        Ok(Self {
            gateway,
            sandbox,
            worker,
            pump,
            mirror,
            generator: None,
        })
    }

    /// Attach the generator used by [`generate_scene`](Self::generate_scene)
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn SceneGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[inline]
    #[must_use]
    pub fn gateway(&self) -> &CommandGateway {
        &self.gateway
    }

    /// Tracked send with the configured timeout and retries
    pub async fn send(&self, command: SandboxCommand) -> Result<CommandResult, SessionError> {
        Ok(self.gateway.send_default(command).await?)
    }

    /// Tracked send with per-call overrides
    pub async fn send_with(
        &self,
        command: SandboxCommand,
        options: SendOptions,
    ) -> Result<CommandResult, SessionError> {
        Ok(self.gateway.send(command, options).await?)
    }

    /// Advisory send, no ack
    pub async fn send_fire_and_forget(&self, command: AdvisoryCommand) -> Result<(), SessionError> {
        Ok(self.gateway.send_fire_and_forget(command).await?)
    }

    /// Viewport pick, routed through the same selection path as `selectObject`
    pub async fn pick(&self, object_id: Option<ObjectId>) -> Result<(), SessionError> {
        self.sandbox
            .pick(object_id)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Ask the generator for markup and load it, replacing the scene
    pub async fn generate_scene(&self, prompt: &str) -> Result<CommandResult, SessionError> {
        let generator = self.generator.as_ref().ok_or(SessionError::NoGenerator)?;
        let markup = generator.generate(prompt).await?;
        tracing::debug!(bytes = markup.len(), "scene markup generated");
        self.send(SandboxCommand::LoadScene { markup }).await
    }

    /// Handle on the scene-graph mirror
    #[must_use]
    pub fn mirror(&self) -> SceneMirror {
        self.mirror.clone()
    }

    /// Untracked sandbox messages (stats, exports, GUI config, camera, errors)
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SandboxMessage> {
        self.gateway.subscribe()
    }

    /// Reject pending commands, stop the sandbox, then the worker thread
    pub async fn teardown(self) {
        let Self {
            gateway,
            sandbox,
            worker,
            pump,
            ..
        } = self;

        gateway.destroy();
        sandbox.shutdown().await;
        pump.abort();
        // Cancelled is the expected outcome
        let _ = pump.await;

        if let Err(err) = tokio::task::spawn_blocking(move || worker.shutdown()).await {
            tracing::error!(error = %err, "geometry worker shutdown failed");
        }
        tracing::info!("session torn down");
    }
}

/// Sandbox -> host: acks resolve through the gateway, scene updates land in the mirror
async fn pump(
    gateway: CommandGateway,
    mirror: MirrorWriter,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    while let Some(raw) = outbound.recv().await {
        match gateway.handle_incoming(&raw) {
            Some(SandboxMessage::SceneGraphUpdate { nodes }) => mirror.replace(nodes),
            Some(SandboxMessage::Error {
                message,
                command_type,
            }) => {
                tracing::warn!(command_type = command_type.as_deref(), %message, "sandbox reported error");
            }
            Some(other) => tracing::trace!(message_type = other.message_type(), "sandbox message"),
            None => {}
        }
    }
    tracing::debug!("sandbox outbound closed");
}
