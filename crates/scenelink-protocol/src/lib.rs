//! scenelink protocol
//!
//! Types that cross the host/sandbox boundary:
//! - **Envelope**: `{ type, commandId?, ...payload }`, host -> sandbox
//! - **SandboxCommand**: closed union, one variant per command type
//! - **SandboxMessage**: acks and untracked pushes, sandbox -> host
//!
//! # Example
//!
//! ```rust
//! use scenelink_protocol::{CommandId, Envelope, PrimitiveKind, SandboxCommand};
//!
//! let envelope = Envelope::tracked(
//!     CommandId::new(),
//!     SandboxCommand::add_primitive(PrimitiveKind::Box),
//! );
//! let text = envelope.encode().unwrap();
//! assert_eq!(Envelope::decode(&text).unwrap(), envelope);
//! ```

#![allow(missing_docs)]

pub mod command;
pub mod error;
pub mod ids;
pub mod message;

// Re-exports
pub use command::{
    AdvisoryCommand, BooleanOp, Envelope, ExportFormat, PrimitiveKind, RejectedEnvelope,
    RenderMode, SandboxCommand, Vec3,
};
pub use error::ProtocolError;
pub use ids::{CommandId, ObjectId};
pub use message::{
    CommandResult, GuiControl, SandboxMessage, SceneNode, SceneNodeKind, SceneStats,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
