//! Error types for geometry processing and the worker protocol

/// Invalid mesh buffers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// Position buffer length is not a whole number of vertices (or triangles, when non-indexed)
    #[error("position buffer of length {0} does not describe whole triangles")]
    MalformedPositions(usize),

    /// Index buffer length is not a multiple of 3
    #[error("index buffer of length {0} is not a multiple of 3")]
    MalformedIndices(usize),

    /// Index refers past the vertex buffer
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    /// Normal buffer does not match positions
    #[error("normal buffer length {normals} does not match position length {positions}")]
    NormalCountMismatch { normals: usize, positions: usize },
}

/// Worker task failures as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// The worker reported a processing failure
    #[error("worker task failed: {0}")]
    TaskFailed(String),

    /// The worker thread is gone; the task will never resolve
    #[error("geometry worker disconnected")]
    Disconnected,

    /// The worker thread could not be started
    #[error("failed to spawn geometry worker: {0}")]
    Spawn(String),
}

impl From<GeometryError> for WorkerError {
    fn from(err: GeometryError) -> Self {
        Self::TaskFailed(err.to_string())
    }
}
