//! scenelink gateway
//!
//! The host's only way to talk to the sandbox:
//! - **CommandGateway**: tracked `send` with timeout and retry, advisory
//!   `send_fire_and_forget`, ack routing, `destroy`
//! - **SandboxPort**: transport seam the serialized envelopes go through
//!
//! # Example
//!
//! ```rust,no_run
//! use scenelink_gateway::{ChannelPort, CommandGateway, GatewayConfig};
//! use scenelink_protocol::{PrimitiveKind, SandboxCommand};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (port, _to_sandbox) = ChannelPort::pair();
//! let gateway = CommandGateway::new(Arc::new(port), GatewayConfig::default());
//!
//! let result = gateway
//!     .send_default(SandboxCommand::add_primitive(PrimitiveKind::Box))
//!     .await?;
//! println!("created {:?}", result.object_id());
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]

pub mod error;
pub mod gateway;
pub mod port;

// Re-exports
pub use error::GatewayError;
pub use gateway::{CommandGateway, GatewayConfig, SendOptions};
pub use port::{ChannelPort, SandboxPort};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
