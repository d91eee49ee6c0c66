//! Sandbox -> host messages
//!
//! Exactly one [`SandboxMessage::CommandAck`] answers every tracked command.
//! Everything else is untracked and may be dropped by the host.

use crate::command::{ExportFormat, Vec3};
use crate::error::ProtocolError;
use crate::ids::{CommandId, ObjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a mirrored scene node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SceneNodeKind {
    /// Plain mesh
    Mesh,
    /// Level-of-detail group
    Lod,
}

/// One entry of the host's scene-graph mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneNode {
    pub id: ObjectId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SceneNodeKind,
    pub visible: bool,
    pub selected: bool,
}

/// Aggregate geometry counters for the live scene
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneStats {
    /// Non-helper objects
    pub objects: usize,
    /// Vertices across rendered representations (LOD level 0)
    pub vertices: usize,
    /// Triangles across rendered representations (LOD level 0)
    pub triangles: usize,
    /// Objects rendered as LOD groups, counted as soon as level 0 is in place
    pub lod_groups: usize,
}

/// One numeric control of the parameter panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuiControl {
    pub key: String,
    pub label: String,
    pub value: f32,
    pub min: f32,
    pub max: f32,
}

/// Messages posted by the sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SandboxMessage {
    /// Acknowledgment of a tracked command
    CommandAck {
        command_id: CommandId,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    /// Complete scene-graph snapshot
    SceneGraphUpdate { nodes: Vec<SceneNode> },
    /// Geometry counters
    GeometryStats { stats: SceneStats },
    /// Problem not tied to a tracked command
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_type: Option<String>,
    },
    /// Encoded export payload
    ExportComplete {
        format: ExportFormat,
        file_name: String,
        byte_length: usize,
        data: Vec<u8>,
    },
    /// Parameter panel description for the current selection
    GuiConfig {
        #[serde(default)]
        object_id: Option<ObjectId>,
        controls: Vec<GuiControl>,
    },
    /// Camera pose after a camera change
    CameraState { position: Vec3, target: Vec3 },
}

impl SandboxMessage {
    /// Successful ack
    #[must_use]
    pub fn ack_ok(command_id: CommandId, data: Option<serde_json::Value>) -> Self {
        Self::CommandAck {
            command_id,
            success: true,
            error: None,
            data,
        }
    }

    /// Failed ack
    #[must_use]
    pub fn ack_err(command_id: CommandId, error: impl Into<String>) -> Self {
        Self::CommandAck {
            command_id,
            success: false,
            error: Some(error.into()),
            data: None,
        }
    }

    /// Wire name of the message type
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::CommandAck { .. } => "commandAck",
            Self::SceneGraphUpdate { .. } => "sceneGraphUpdate",
            Self::GeometryStats { .. } => "geometryStats",
            Self::Error { .. } => "error",
            Self::ExportComplete { .. } => "exportComplete",
            Self::GuiConfig { .. } => "guiConfig",
            Self::CameraState { .. } => "cameraState",
        }
    }

    /// Serialize to wire text
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }

    /// Parse wire text
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::from)
    }
}

/// Outcome of a tracked command as seen by the host
///
/// Produced at most once per command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub command_id: CommandId,
    pub command_type: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CommandResult {
    /// Object id carried in the ack payload, if any
    #[must_use]
    pub fn object_id(&self) -> Option<ObjectId> {
        self.data
            .as_ref()
            .and_then(|d| d.get("objectId"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
