//! Error types for the sandbox runtime

use scenelink_geometry::{GeometryError, WorkerError};
use scenelink_protocol::{ExportFormat, ObjectId};
use thiserror::Error;

/// Command failure inside the sandbox
///
/// The `Display` text is what the failure ack carries back to the host.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxError {
    /// No live scene object with this id
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// Target exists but has no renderable mesh
    #[error("object {0} has no mesh")]
    NotAMesh(ObjectId),

    /// Object was removed or its geometry replaced while async work ran
    #[error("object {0} changed before the result could be applied")]
    Stale(ObjectId),

    /// Boolean operands resolved to the same object
    #[error("boolean target and tool must be different objects")]
    SameOperand,

    /// CSG kernel failure
    #[error(transparent)]
    Csg(#[from] CsgError),

    /// Worker task rejected
    #[error("geometry task failed: {0}")]
    Worker(#[from] WorkerError),

    /// Invalid geometry buffers
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Export plugin failure
    #[error(transparent)]
    Export(#[from] ExportError),

    /// `loadScene` markup could not be parsed
    #[error("invalid scene markup: {0}")]
    Markup(String),

    /// Runtime task is no longer running
    #[error("sandbox runtime stopped")]
    Stopped,
}

/// Boolean evaluation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsgError {
    #[error("boolean operand {0} has no triangles")]
    EmptyOperand(&'static str),

    #[error("boolean {0} produced an empty mesh")]
    EmptyResult(&'static str),

    #[error("csg kernel error: {0}")]
    Kernel(String),
}

/// Export plugin failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("no exporter registered for format '{}'", .0.extension())]
    Unsupported(ExportFormat),

    #[error("encoding {format} failed: {reason}")]
    Encode { format: &'static str, reason: String },
}
