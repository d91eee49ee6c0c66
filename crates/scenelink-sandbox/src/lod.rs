//! LOD synthesizer
//!
//! Large meshes are wrapped in a [`LodGroup`] whose level 0 is the original
//! geometry, available immediately. Lower levels are decimated on the
//! geometry worker and come back later as [`LodCompletion`]s, which the
//! runtime applies with [`apply_completion`] in whatever order they arrive.

use crate::scene::{LodGroup, ObjectKind, Scene};
use scenelink_geometry::{DecimateParams, Geometry, TaskKind, WorkerClient, WorkerError};
use scenelink_protocol::ObjectId;
use tokio::sync::mpsc;

/// One generated level: fraction of vertices kept and switch distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodLevelSpec {
    pub percent: f32,
    pub distance: f32,
}

/// LOD synthesis settings
#[derive(Debug, Clone, PartialEq)]
pub struct LodConfig {
    /// Meshes with more vertices than this get a LOD group
    pub vertex_threshold: usize,
    /// Levels generated beyond level 0
    pub levels: Vec<LodLevelSpec>,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            vertex_threshold: 5000,
            levels: vec![
                LodLevelSpec {
                    percent: 0.5,
                    distance: 50.0,
                },
                LodLevelSpec {
                    percent: 0.2,
                    distance: 150.0,
                },
            ],
        }
    }
}

/// Result of one level's worker task
#[derive(Debug)]
pub struct LodCompletion {
    pub object_id: ObjectId,
    /// Object revision the level was computed from
    pub revision: u64,
    pub distance: f32,
    pub result: Result<Geometry, WorkerError>,
}

/// Builds LOD groups and schedules their lower levels
#[derive(Debug, Clone)]
pub struct LodSynthesizer {
    config: LodConfig,
    worker: WorkerClient,
}

impl LodSynthesizer {
    #[must_use]
    pub fn new(config: LodConfig, worker: WorkerClient) -> Self {
        Self { config, worker }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    /// Whether `geometry` is large enough to get a LOD group
    #[inline]
    #[must_use]
    pub fn needs_lod(&self, geometry: &Geometry) -> bool {
        geometry.vertex_count() > self.config.vertex_threshold
    }

    /// Wrap `geometry` for object `object_id`, choosing mesh or LOD group
    ///
    /// For a LOD group, one worker task per configured level is started and
    /// its completion is sent on `events`. Must be called within a tokio
    /// runtime.
    pub fn object_kind<E>(
        &self,
        object_id: ObjectId,
        revision: u64,
        geometry: Geometry,
        events: &mpsc::UnboundedSender<E>,
    ) -> ObjectKind
    where
        E: From<LodCompletion> + Send + 'static,
    {
        if !self.needs_lod(&geometry) {
            return ObjectKind::Mesh(geometry);
        }

        tracing::debug!(
            %object_id,
            vertices = geometry.vertex_count(),
            levels = self.config.levels.len(),
            "synthesizing LOD levels"
        );
        for spec in &self.config.levels {
            let task = self
                .worker
                .run_task(TaskKind::Decimate(DecimateParams::new(spec.percent)), &geometry);
            let events = events.clone();
            let distance = spec.distance;
            tokio::spawn(async move {
                let result = task.await;
                let completion = LodCompletion {
                    object_id,
                    revision,
                    distance,
                    result,
                };
                // Runtime gone: nothing left to attach the level to.
                let _ = events.send(E::from(completion));
            });
        }
        ObjectKind::Lod(LodGroup::new(geometry))
    }
}

/// Insert a finished level into its group
///
/// The level is dropped when the object was removed, is no longer a LOD
/// group, or had its geometry replaced since the task started. Failed tasks
/// are logged and the level omitted. Returns whether the scene changed.
pub fn apply_completion(scene: &mut Scene, completion: LodCompletion) -> bool {
    let LodCompletion {
        object_id,
        revision,
        distance,
        result,
    } = completion;

    let geometry = match result {
        Ok(geometry) => geometry,
        Err(err) => {
            tracing::warn!(%object_id, distance, error = %err, "LOD level failed, omitting");
            return false;
        }
    };

    let Some(object) = scene.get_mut(object_id) else {
        tracing::debug!(%object_id, distance, "LOD level for removed object dropped");
        return false;
    };
    if object.revision != revision {
        tracing::debug!(%object_id, distance, "LOD level for replaced geometry dropped");
        return false;
    }
    match &mut object.kind {
        ObjectKind::Lod(group) => {
            tracing::debug!(%object_id, distance, vertices = geometry.vertex_count(), "LOD level ready");
            group.insert_level(geometry, distance);
            true
        }
        _ => false,
    }
}
