//! Sandbox runtime dispatcher
//!
//! One tokio task owns the [`Scene`] outright. Everything that touches it
//! arrives on one of two queues:
//! - inbound: raw host text and pointer picks, through [`SandboxSender`]
//! - events: results of asynchronous work (worker tasks, LOD levels, the
//!   deferred boolean tick) posted back by the runtime's own spawned tasks
//!
//! Every event re-checks that its target is still live before it mutates
//! anything. Each tracked command is answered by exactly one ack, on
//! whichever path finishes it.

use crate::csg::{self, BooleanEvaluator, CsgPlan, CsgrsEvaluator};
use crate::debounce::Debouncer;
use crate::error::SandboxError;
use crate::export::{ExportGroup, ExporterRegistry, MeshExporter};
use crate::lod::{self, LodCompletion, LodConfig, LodSynthesizer};
use crate::markup::SceneDocument;
use crate::scene::{
    primitive_geometry, Material, ObjectKind, Scene, SceneObject, Transform,
};
use scenelink_geometry::{
    primitives::DEFAULT_DETAIL, DecimateParams, Geometry, TaskKind, WorkerClient, WorkerError,
};
use scenelink_protocol::{
    CommandId, Envelope, GuiControl, ObjectId, RenderMode, SandboxCommand, SandboxMessage, Vec3,
};
use serde_json::{json, Value};
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Upper bound on primitive segment counts
pub const MAX_DETAIL: u32 = 512;

const DEFAULT_CAMERA: (Vec3, Vec3) = ([5.0, 5.0, 5.0], [0.0, 0.0, 0.0]);

/// Runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Quiet period before a scene-graph broadcast
    pub broadcast_debounce: Duration,
    /// Inbound queue depth
    pub channel_capacity: usize,
    pub lod: LodConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            broadcast_debounce: Duration::from_millis(200),
            channel_capacity: 256,
            lod: LodConfig::default(),
        }
    }
}

#[derive(Debug)]
enum Inbound {
    Raw(String),
    Pick(Option<ObjectId>),
    Shutdown,
}

/// Asynchronous work re-entering the runtime
#[derive(Debug)]
pub(crate) enum RuntimeEvent {
    Lod(LodCompletion),
    GeometryTask {
        command_id: Option<CommandId>,
        command_type: &'static str,
        object_id: ObjectId,
        revision: u64,
        result: Result<Geometry, WorkerError>,
    },
    Boolean {
        command_id: Option<CommandId>,
        plan: Box<CsgPlan>,
    },
}

impl From<LodCompletion> for RuntimeEvent {
    fn from(completion: LodCompletion) -> Self {
        Self::Lod(completion)
    }
}

enum Reply {
    /// Finished now; ack with this payload
    Done(Option<Value>),
    /// Ack is sent when the re-entering event is handled
    Deferred,
}

/// Cloneable way into a running sandbox
#[derive(Debug, Clone)]
pub struct SandboxSender {
    inbound: mpsc::Sender<Inbound>,
}

impl SandboxSender {
    /// Deliver raw host text, as posted across the isolation boundary
    pub async fn post(&self, raw: impl Into<String>) -> Result<(), SandboxError> {
        self.inbound
            .send(Inbound::Raw(raw.into()))
            .await
            .map_err(|_| SandboxError::Stopped)
    }

    /// Pointer pick in the viewport; `None` clicks empty space
    pub async fn pick(&self, object_id: Option<ObjectId>) -> Result<(), SandboxError> {
        self.inbound
            .send(Inbound::Pick(object_id))
            .await
            .map_err(|_| SandboxError::Stopped)
    }
}

/// Owner handle of a spawned runtime
#[derive(Debug)]
pub struct SandboxHandle {
    sender: SandboxSender,
    task: JoinHandle<()>,
}

impl SandboxHandle {
    #[must_use]
    pub fn sender(&self) -> SandboxSender {
        self.sender.clone()
    }

    /// See [`SandboxSender::post`]
    pub async fn post(&self, raw: impl Into<String>) -> Result<(), SandboxError> {
        self.sender.post(raw).await
    }

    /// See [`SandboxSender::pick`]
    pub async fn pick(&self, object_id: Option<ObjectId>) -> Result<(), SandboxError> {
        self.sender.pick(object_id).await
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the runtime and wait for it to exit
    ///
    /// Commands still waiting on asynchronous work are never acked.
    pub async fn shutdown(self) {
        // Already stopped if the send fails
        let _ = self.sender.inbound.send(Inbound::Shutdown).await;
        if let Err(err) = self.task.await {
            tracing::error!(error = %err, "sandbox runtime task failed");
        }
    }
}

/// Configures and starts a [`SandboxRuntime`]
pub struct SandboxBuilder {
    config: SandboxConfig,
    evaluator: Arc<dyn BooleanEvaluator>,
    exporters: ExporterRegistry,
}

impl SandboxBuilder {
    /// Builder with the `csgrs` evaluator and the built-in exporters
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            evaluator: Arc::new(CsgrsEvaluator),
            exporters: ExporterRegistry::with_defaults(),
        }
    }

    /// Replace the CSG kernel
    #[must_use]
    pub fn evaluator(mut self, evaluator: Arc<dyn BooleanEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Register an additional export format
    #[must_use]
    pub fn exporter(mut self, exporter: Arc<dyn MeshExporter>) -> Self {
        self.exporters.register(exporter);
        self
    }

    /// Spawn the runtime task
    ///
    /// Serialized [`SandboxMessage`]s are written to `outbound`. Must be
    /// called within a tokio runtime.
    pub fn spawn(self, worker: WorkerClient, outbound: mpsc::UnboundedSender<String>) -> SandboxHandle {
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let runtime = SandboxRuntime {
            scene: Scene::new(),
            inbound: inbound_rx,
            events_tx,
            events_rx,
            outbound,
            lod: LodSynthesizer::new(self.config.lod.clone(), worker.clone()),
            worker,
            evaluator: self.evaluator,
            exporters: self.exporters,
            broadcast: Debouncer::new(self.config.broadcast_debounce),
            camera: DEFAULT_CAMERA,
            render_mode: RenderMode::default(),
        };
        let task = tokio::spawn(runtime.run());

        SandboxHandle {
            sender: SandboxSender { inbound: inbound_tx },
            task,
        }
    }
}

/// The sandbox's single cooperative loop
pub struct SandboxRuntime {
    scene: Scene,
    inbound: mpsc::Receiver<Inbound>,
    events_tx: mpsc::UnboundedSender<RuntimeEvent>,
    events_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    outbound: mpsc::UnboundedSender<String>,
    worker: WorkerClient,
    lod: LodSynthesizer,
    evaluator: Arc<dyn BooleanEvaluator>,
    exporters: ExporterRegistry,
    broadcast: Debouncer<()>,
    camera: (Vec3, Vec3),
    render_mode: RenderMode,
}

impl SandboxRuntime {
    /// Shorthand for [`SandboxBuilder::new`]
    #[must_use]
    pub fn builder(config: SandboxConfig) -> SandboxBuilder {
        SandboxBuilder::new(config)
    }

    async fn run(mut self) {
        tracing::info!("sandbox runtime started");
        loop {
            tokio::select! {
                inbound = self.inbound.recv() => match inbound {
                    Some(Inbound::Raw(text)) => self.handle_raw(&text),
                    Some(Inbound::Pick(object_id)) => self.handle_pick(object_id),
                    Some(Inbound::Shutdown) | None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                () = self.broadcast.fired() => self.broadcast_scene(),
            }
        }
        tracing::info!(objects = self.scene.len(), "sandbox runtime stopped");
    }

    fn handle_raw(&mut self, raw: &str) {
        let Envelope {
            command_id,
            command,
        } = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(rejected) => {
                tracing::warn!(
                    command_id = ?rejected.command_id,
                    command_type = ?rejected.command_type,
                    reason = %rejected.reason,
                    "rejected invalid command"
                );
                let message = format!("invalid command: {}", rejected.reason);
                match rejected.command_id {
                    Some(id) => self.post(&SandboxMessage::ack_err(id, message)),
                    None => self.post(&SandboxMessage::Error {
                        message,
                        command_type: rejected.command_type,
                    }),
                }
                return;
            }
        };

        let command_type = command.command_type();
        tracing::debug!(?command_id, command_type, "dispatching command");
        match self.dispatch(command_id, command) {
            Ok(Reply::Done(data)) => self.finish(command_id, command_type, Ok(data)),
            Ok(Reply::Deferred) => {}
            Err(err) => self.finish(command_id, command_type, Err(err)),
        }
    }

    fn dispatch(
        &mut self,
        command_id: Option<CommandId>,
        command: SandboxCommand,
    ) -> Result<Reply, SandboxError> {
        match command {
            SandboxCommand::AddPrimitive {
                prim_type,
                name,
                position,
                detail,
                color,
            } => {
                let detail = detail.unwrap_or(DEFAULT_DETAIL).min(MAX_DETAIL);
                let object = SceneObject::new(
                    name.unwrap_or_else(|| prim_type.label().to_owned()),
                    ObjectKind::Mesh(Geometry::default()),
                )
                .with_transform(position.map_or_else(Transform::default, Transform::at))
                .with_material(color.map_or_else(Material::default, Material::colored));
                let id = self.insert_object(object, primitive_geometry(prim_type, detail));
                Ok(Reply::Done(Some(json!({ "objectId": id }))))
            }

            SandboxCommand::RemoveObject { object_id } => {
                let was_selected = self.scene.selection() == Some(object_id);
                self.scene
                    .remove(object_id)
                    .ok_or(SandboxError::ObjectNotFound(object_id))?;
                self.mark_dirty();
                if was_selected {
                    self.post_gui_config();
                }
                Ok(Reply::Done(Some(json!({ "objectId": object_id }))))
            }

            SandboxCommand::SelectObject { object_id } => {
                self.set_selection(object_id)?;
                Ok(Reply::Done(Some(json!({ "objectId": object_id }))))
            }

            SandboxCommand::SetTransform {
                object_id,
                position,
                rotation,
                scale,
            } => {
                self.scene
                    .require_mut(object_id)?
                    .transform
                    .update(position, rotation, scale);
                if self.scene.selection() == Some(object_id) {
                    self.post_gui_config();
                }
                Ok(Reply::Done(None))
            }

            SandboxCommand::SetVisibility { object_id, visible } => {
                self.scene.require_mut(object_id)?.visible = visible;
                self.mark_dirty();
                Ok(Reply::Done(None))
            }

            SandboxCommand::RenameObject { object_id, name } => {
                self.scene.require_mut(object_id)?.name = name;
                self.mark_dirty();
                Ok(Reply::Done(None))
            }

            SandboxCommand::ClearScene => {
                let had_selection = self.scene.selection().is_some();
                self.scene.clear();
                self.mark_dirty();
                if had_selection {
                    self.post_gui_config();
                }
                Ok(Reply::Done(None))
            }

            SandboxCommand::LoadScene { markup } => {
                // Parse fully before touching the current scene
                let document = SceneDocument::parse(&markup)?;
                let had_selection = self.scene.selection().is_some();
                self.scene.clear();
                let ids: Vec<ObjectId> = document
                    .objects
                    .iter()
                    .map(|entry| {
                        let detail = entry.detail.unwrap_or(DEFAULT_DETAIL).min(MAX_DETAIL);
                        let object = SceneObject::new(
                            entry.display_name(),
                            ObjectKind::Mesh(Geometry::default()),
                        )
                        .with_transform(entry.transform())
                        .with_material(entry.material());
                        self.insert_object(object, primitive_geometry(entry.primitive, detail))
                    })
                    .collect();
                self.mark_dirty();
                if had_selection {
                    self.post_gui_config();
                }
                tracing::info!(objects = ids.len(), "scene loaded from markup");
                Ok(Reply::Done(Some(json!({ "objectIds": ids }))))
            }

            SandboxCommand::Decimate { object_id, percent } => self.start_geometry_task(
                command_id,
                object_id,
                TaskKind::Decimate(DecimateParams::new(percent)),
            ),

            SandboxCommand::Repair { object_id } => {
                self.start_geometry_task(command_id, object_id, TaskKind::Repair)
            }

            SandboxCommand::PerformBoolean {
                op,
                target_id,
                tool_id,
            } => {
                let plan = csg::plan(&self.scene, op, target_id, tool_id)?;
                // Receiver lives in `self`, so the send cannot fail
                let _ = self.events_tx.send(RuntimeEvent::Boolean {
                    command_id,
                    plan: Box::new(plan),
                });
                Ok(Reply::Deferred)
            }

            SandboxCommand::ExportScene { format } => {
                let group = ExportGroup::from_scene(&self.scene);
                let data = self.exporters.export(format, &group)?;
                let file_name = format!("scene.{}", format.extension());
                let byte_length = data.len();
                tracing::info!(?format, byte_length, meshes = group.meshes.len(), "scene exported");
                self.post(&SandboxMessage::ExportComplete {
                    format,
                    file_name: file_name.clone(),
                    byte_length,
                    data,
                });
                Ok(Reply::Done(Some(
                    json!({ "fileName": file_name, "byteLength": byte_length }),
                )))
            }

            SandboxCommand::GetGeometryStats => {
                let stats = self.scene.stats();
                self.post(&SandboxMessage::GeometryStats { stats });
                Ok(Reply::Done(serde_json::to_value(stats).ok()))
            }

            SandboxCommand::SetCamera { position, target } => {
                self.camera = (position, target);
                let (position, target) = self.camera;
                self.post(&SandboxMessage::CameraState { position, target });
                Ok(Reply::Done(None))
            }

            SandboxCommand::SetRenderMode { mode } => {
                if self.render_mode != mode {
                    tracing::debug!(?mode, "render mode changed");
                }
                self.render_mode = mode;
                Ok(Reply::Done(None))
            }

            SandboxCommand::ToggleGrid { visible } => {
                let changed = self.scene.set_grid_visible(visible);
                tracing::debug!(visible, changed, "grid visibility");
                Ok(Reply::Done(None))
            }
        }
    }

    fn start_geometry_task(
        &self,
        command_id: Option<CommandId>,
        object_id: ObjectId,
        kind: TaskKind,
    ) -> Result<Reply, SandboxError> {
        let object = self.scene.require(object_id)?;
        let geometry = object
            .renderable()
            .ok_or(SandboxError::NotAMesh(object_id))?;
        let revision = object.revision;

        let task = self.worker.run_task(kind, geometry);
        let events = self.events_tx.clone();
        let command_type = kind.as_str();
        tokio::spawn(async move {
            let result = task.await;
            // Runtime gone: the command will never be acked
            let _ = events.send(RuntimeEvent::GeometryTask {
                command_id,
                command_type,
                object_id,
                revision,
                result,
            });
        });
        Ok(Reply::Deferred)
    }

    fn handle_event(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Lod(completion) => {
                lod::apply_completion(&mut self.scene, completion);
            }
            RuntimeEvent::GeometryTask {
                command_id,
                command_type,
                object_id,
                revision,
                result,
            } => {
                let outcome = self.apply_geometry(object_id, revision, result);
                self.finish(command_id, command_type, outcome);
            }
            RuntimeEvent::Boolean { command_id, plan } => {
                let outcome = self.commit_boolean(&plan);
                self.finish(command_id, "performBoolean", outcome);
            }
        }
    }

    fn apply_geometry(
        &mut self,
        object_id: ObjectId,
        revision: u64,
        result: Result<Geometry, WorkerError>,
    ) -> Result<Option<Value>, SandboxError> {
        let geometry = result?;
        match self.scene.revision(object_id) {
            None => return Err(SandboxError::ObjectNotFound(object_id)),
            Some(current) if current != revision => return Err(SandboxError::Stale(object_id)),
            Some(_) => {}
        }

        let vertices = geometry.vertex_count();
        let triangles = geometry.triangle_count();
        let next = revision + 1;
        let kind = self
            .lod
            .object_kind(object_id, next, geometry, &self.events_tx);
        let object = self.scene.require_mut(object_id)?;
        object.kind = kind;
        object.revision = next;
        self.mark_dirty();

        Ok(Some(json!({
            "objectId": object_id,
            "vertices": vertices,
            "triangles": triangles,
        })))
    }

    fn commit_boolean(&mut self, plan: &CsgPlan) -> Result<Option<Value>, SandboxError> {
        let brush = csg::evaluate(&self.scene, plan, self.evaluator.as_ref())?;

        // Success: only now is the scene mutated
        self.scene.remove(plan.target.id);
        self.scene.remove(plan.tool.id);
        let object = SceneObject::new(plan.result_name.clone(), ObjectKind::Mesh(Geometry::default()))
            .with_material(plan.material);
        let id = self.insert_object(object, brush.geometry);
        self.set_selection(Some(id))?;

        tracing::info!(
            op = %plan.op,
            target = %plan.target.id,
            tool = %plan.tool.id,
            result = %id,
            "boolean applied"
        );
        Ok(Some(json!({ "objectId": id, "name": plan.result_name })))
    }

    fn insert_object(&mut self, mut object: SceneObject, geometry: Geometry) -> ObjectId {
        object.kind = self
            .lod
            .object_kind(object.id, object.revision, geometry, &self.events_tx);
        let id = self.scene.insert(object);
        self.mark_dirty();
        id
    }

    fn set_selection(&mut self, object_id: Option<ObjectId>) -> Result<(), SandboxError> {
        if self.scene.select(object_id)? {
            self.mark_dirty();
            self.post_gui_config();
        }
        Ok(())
    }

    fn handle_pick(&mut self, object_id: Option<ObjectId>) {
        if let Err(err) = self.set_selection(object_id) {
            tracing::warn!(error = %err, "pick ignored");
        }
    }

    fn finish(
        &self,
        command_id: Option<CommandId>,
        command_type: &'static str,
        outcome: Result<Option<Value>, SandboxError>,
    ) {
        match (command_id, outcome) {
            (Some(id), Ok(data)) => self.post(&SandboxMessage::ack_ok(id, data)),
            (Some(id), Err(err)) => {
                tracing::debug!(command_id = %id, command_type, error = %err, "command failed");
                self.post(&SandboxMessage::ack_err(id, err.to_string()));
            }
            (None, Ok(_)) => {}
            (None, Err(err)) => {
                tracing::warn!(command_type, error = %err, "untracked command failed");
                self.post(&SandboxMessage::Error {
                    message: err.to_string(),
                    command_type: Some(command_type.to_owned()),
                });
            }
        }
    }

    fn mark_dirty(&mut self) {
        self.broadcast.trigger(());
    }

    fn broadcast_scene(&self) {
        self.post(&SandboxMessage::SceneGraphUpdate {
            nodes: self.scene.snapshot(),
        });
    }

    fn post_gui_config(&self) {
        let selected = self.scene.selection().and_then(|id| self.scene.get(id));
        self.post(&SandboxMessage::GuiConfig {
            object_id: selected.map(|o| o.id),
            controls: selected.map(gui_controls).unwrap_or_default(),
        });
    }

    fn post(&self, message: &SandboxMessage) {
        match message.encode() {
            Ok(text) => {
                if self.outbound.send(text).is_err() {
                    tracing::debug!(kind = message.message_type(), "host gone, message dropped");
                }
            }
            Err(err) => tracing::error!(error = %err, "failed to encode sandbox message"),
        }
    }
}

fn gui_controls(object: &SceneObject) -> Vec<GuiControl> {
    let t = &object.transform;
    let groups = [
        ("position", "Position", t.position, -50.0, 50.0),
        ("rotation", "Rotation", t.rotation, -PI, PI),
        ("scale", "Scale", t.scale, 0.01, 10.0),
    ];
    groups
        .into_iter()
        .flat_map(|(key, label, values, min, max)| {
            ["x", "y", "z"]
                .into_iter()
                .enumerate()
                .map(move |(i, axis)| GuiControl {
                    key: format!("{key}.{axis}"),
                    label: format!("{label} {}", axis.to_uppercase()),
                    value: values[i],
                    min,
                    max,
                })
        })
        .collect()
}
