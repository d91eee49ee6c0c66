//! scenelink geometry
//!
//! Mesh buffers and the off-thread geometry worker:
//! - **Geometry**: positions, optional indices, optional normals
//! - **TransferBuffer**: move-only buffer handed between contexts
//! - **decimate / repair**: the two worker operations
//! - **GeometryWorker**: dedicated compute thread, stateless per call
//! - **WorkerClient**: per-task request/response correlation
//!
//! # Example
//!
//! ```rust,no_run
//! use scenelink_geometry::{primitives, DecimateParams, GeometryWorker, TaskKind, WorkerClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (worker, responses) = GeometryWorker::spawn()?;
//! let client = WorkerClient::connect(&worker, responses);
//!
//! let sphere = primitives::sphere(128);
//! let lighter = client
//!     .run_task(TaskKind::Decimate(DecimateParams::new(0.5)), &sphere)
//!     .await?;
//! assert!(lighter.vertex_count() <= sphere.vertex_count());
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]

pub mod buffer;
pub mod decimate;
pub mod error;
pub mod primitives;
pub mod repair;
pub mod task;
pub mod worker;

// Re-exports
pub use buffer::{compute_vertex_normals, Geometry, TransferBuffer};
pub use decimate::{decimate, DecimateParams};
pub use error::{GeometryError, WorkerError};
pub use repair::{repair, MERGE_TOLERANCE};
pub use task::WorkerClient;
pub use worker::{
    process, GeometryWorker, TaskId, TaskKind, TaskStatus, WorkerRequest, WorkerResponse,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
