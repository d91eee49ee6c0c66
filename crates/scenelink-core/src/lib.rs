//! scenelink core
//!
//! Host-side entry point. A [`Session`] wires together:
//! - the geometry worker thread
//! - the sandbox runtime that owns the scene
//! - the command gateway the host sends through
//! - the pump that routes sandbox replies and keeps the [`SceneMirror`] current
//!
//! plus [`BridgeConfig`] loading, the [`SceneGenerator`] seam and command
//! [`Script`]s for the `scenelink` binary.
//!
//! # Example
//!
//! ```rust,no_run
//! use scenelink_core::{BridgeConfig, Session};
//! use scenelink_protocol::{PrimitiveKind, SandboxCommand};
//! use scenelink_sandbox::CsgrsEvaluator;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::connect(&BridgeConfig::default(), Arc::new(CsgrsEvaluator))?;
//!
//! let added = session
//!     .send(SandboxCommand::add_primitive(PrimitiveKind::Torus))
//!     .await?;
//! println!("created {:?}", added.object_id());
//!
//! session.teardown().await;
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod generator;
pub mod mirror;
pub mod script;
pub mod session;

// Re-exports
pub use config::{BridgeConfig, GatewaySection, LodLevelEntry, LodSection, SandboxSection};
pub use error::{ConfigError, GeneratorError, ScriptError, SessionError};
pub use generator::SceneGenerator;
pub use mirror::SceneMirror;
pub use script::{Script, StepReport};
pub use session::{RuntimePort, Session};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
