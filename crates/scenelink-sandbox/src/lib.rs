//! scenelink sandbox
//!
//! The isolated side of the bridge. A single runtime task owns the scene and
//! answers host commands:
//! - **Scene**: objects, helpers, selection, snapshot for the host mirror
//! - **Debouncer**: trailing-edge scene-graph broadcast
//! - **LodSynthesizer**: level 0 now, decimated levels when the worker replies
//! - **csg**: plan, defer one tick, evaluate, commit
//! - **export**: pluggable mesh encoders (STL, OBJ)
//! - **SandboxRuntime**: envelope validation, dispatch, exactly-once acks
//!
//! # Example
//!
//! ```rust,no_run
//! use scenelink_geometry::{GeometryWorker, WorkerClient};
//! use scenelink_sandbox::{SandboxConfig, SandboxRuntime};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (worker, responses) = GeometryWorker::spawn()?;
//! let client = WorkerClient::connect(&worker, responses);
//! let (outbound, mut from_sandbox) = mpsc::unbounded_channel();
//!
//! let sandbox = SandboxRuntime::builder(SandboxConfig::default()).spawn(client, outbound);
//! sandbox
//!     .post(r#"{"type":"addPrimitive","commandId":"01J0000000000000000000000A","primType":"box"}"#)
//!     .await?;
//! let ack = from_sandbox.recv().await;
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]

pub mod csg;
pub mod debounce;
pub mod error;
pub mod export;
pub mod lod;
pub mod markup;
pub mod runtime;
pub mod scene;

// Re-exports
pub use csg::{BooleanEvaluator, Brush, CsgPlan, CsgrsEvaluator};
pub use debounce::Debouncer;
pub use error::{CsgError, ExportError, SandboxError};
pub use export::{ExportGroup, ExportMesh, ExporterRegistry, MeshExporter, ObjExporter, StlExporter};
pub use lod::{LodCompletion, LodConfig, LodLevelSpec, LodSynthesizer};
pub use markup::{SceneDocument, SceneEntry};
pub use runtime::{SandboxBuilder, SandboxConfig, SandboxHandle, SandboxRuntime, SandboxSender};
pub use scene::{LodGroup, Material, ObjectKind, Scene, SceneObject, Transform};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
