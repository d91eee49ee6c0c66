//! Host -> sandbox command union
//!
//! Every command the sandbox understands is one variant of [`SandboxCommand`].
//! The wire form is the internally tagged JSON object
//! `{ "type": "<camelCaseName>", "commandId"?: "...", ...payload }`.

use crate::error::ProtocolError;
use crate::ids::{CommandId, ObjectId};
use serde::{Deserialize, Serialize};

/// Three-component vector as it travels on the wire
pub type Vec3 = [f32; 3];

/// Primitive shapes the sandbox can build without external markup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrimitiveKind {
    /// Axis-aligned unit box
    Box,
    /// UV sphere
    Sphere,
    /// Capped cylinder
    Cylinder,
    /// Single-sided square
    Plane,
    /// Ring torus
    Torus,
}

impl PrimitiveKind {
    /// Display name used for default object names
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Box => "Box",
            Self::Sphere => "Sphere",
            Self::Cylinder => "Cylinder",
            Self::Plane => "Plane",
            Self::Torus => "Torus",
        }
    }
}

/// Boolean operation applied by the CSG coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanOp {
    /// target ∪ tool
    Union,
    /// target − tool
    Subtract,
    /// target ∩ tool
    Intersect,
}

impl BooleanOp {
    /// Wire name of the operation
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Union => "union",
            Self::Subtract => "subtract",
            Self::Intersect => "intersect",
        }
    }
}

impl std::fmt::Display for BooleanOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewport shading mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderMode {
    /// Lit, filled surfaces
    #[default]
    Solid,
    /// Edges only
    Wireframe,
    /// Translucent surfaces
    Xray,
}

/// Mesh export formats
///
/// Only some formats have an encoder registered in a given sandbox; asking for
/// an unregistered one fails the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Binary STL
    Stl,
    /// Wavefront OBJ
    Obj,
    /// glTF 2.0 binary
    Gltf,
    /// Apple USDZ
    Usdz,
    /// ISO 10303 STEP
    Step,
}

impl ExportFormat {
    /// File extension for the format
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Stl => "stl",
            Self::Obj => "obj",
            Self::Gltf => "glb",
            Self::Usdz => "usdz",
            Self::Step => "step",
        }
    }
}

/// Closed set of commands accepted by the sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SandboxCommand {
    /// Build a primitive mesh and insert it into the scene
    AddPrimitive {
        prim_type: PrimitiveKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Vec3>,
        /// Tessellation detail (segments) for curved primitives
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<u32>,
        /// 0xRRGGBB material color
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<u32>,
    },
    /// Dispose an object
    RemoveObject { object_id: ObjectId },
    /// Change (or clear) the selection
    SelectObject {
        #[serde(default)]
        object_id: Option<ObjectId>,
    },
    /// Patch an object's local transform
    SetTransform {
        object_id: ObjectId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Vec3>,
        /// Euler XYZ, radians
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rotation: Option<Vec3>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<Vec3>,
    },
    /// Show or hide an object
    SetVisibility { object_id: ObjectId, visible: bool },
    /// Rename an object
    RenameObject { object_id: ObjectId, name: String },
    /// Dispose every non-helper object
    ClearScene,
    /// Replace the scene with generated markup
    LoadScene { markup: String },
    /// Simplify an object's mesh on the geometry worker
    Decimate {
        object_id: ObjectId,
        /// Fraction of vertices to keep
        percent: f32,
    },
    /// Merge duplicate vertices and recompute normals on the geometry worker
    Repair { object_id: ObjectId },
    /// Combine two objects into one
    PerformBoolean {
        op: BooleanOp,
        target_id: ObjectId,
        tool_id: ObjectId,
    },
    /// Encode the visible scene in a mesh format
    ExportScene { format: ExportFormat },
    /// Request a `geometryStats` push
    GetGeometryStats,
    /// Move the camera (advisory)
    SetCamera { position: Vec3, target: Vec3 },
    /// Switch viewport shading (advisory)
    SetRenderMode { mode: RenderMode },
    /// Show or hide the ground grid (advisory)
    ToggleGrid { visible: bool },
}

impl SandboxCommand {
    /// Wire name of the command type
    #[must_use]
    pub fn command_type(&self) -> &'static str {
        match self {
            Self::AddPrimitive { .. } => "addPrimitive",
            Self::RemoveObject { .. } => "removeObject",
            Self::SelectObject { .. } => "selectObject",
            Self::SetTransform { .. } => "setTransform",
            Self::SetVisibility { .. } => "setVisibility",
            Self::RenameObject { .. } => "renameObject",
            Self::ClearScene => "clearScene",
            Self::LoadScene { .. } => "loadScene",
            Self::Decimate { .. } => "decimate",
            Self::Repair { .. } => "repair",
            Self::PerformBoolean { .. } => "performBoolean",
            Self::ExportScene { .. } => "exportScene",
            Self::GetGeometryStats => "getGeometryStats",
            Self::SetCamera { .. } => "setCamera",
            Self::SetRenderMode { .. } => "setRenderMode",
            Self::ToggleGrid { .. } => "toggleGrid",
        }
    }

    /// Whether losing this command is acceptable
    #[must_use]
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            Self::SetCamera { .. } | Self::SetRenderMode { .. } | Self::ToggleGrid { .. }
        )
    }

    /// Convenience constructor for a default primitive
    #[must_use]
    pub fn add_primitive(prim_type: PrimitiveKind) -> Self {
        Self::AddPrimitive {
            prim_type,
            name: None,
            position: None,
            detail: None,
            color: None,
        }
    }
}

/// Idempotent, advisory commands that may be sent without tracking
///
/// Kept as a separate type so that untracked delivery cannot be requested for
/// a command whose loss would matter.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisoryCommand {
    /// Move the camera
    SetCamera { position: Vec3, target: Vec3 },
    /// Switch viewport shading
    SetRenderMode { mode: RenderMode },
    /// Show or hide the ground grid
    ToggleGrid { visible: bool },
}

impl From<AdvisoryCommand> for SandboxCommand {
    fn from(cmd: AdvisoryCommand) -> Self {
        match cmd {
            AdvisoryCommand::SetCamera { position, target } => Self::SetCamera { position, target },
            AdvisoryCommand::SetRenderMode { mode } => Self::SetRenderMode { mode },
            AdvisoryCommand::ToggleGrid { visible } => Self::ToggleGrid { visible },
        }
    }
}

impl TryFrom<SandboxCommand> for AdvisoryCommand {
    /// The command, handed back when it is not advisory
    type Error = SandboxCommand;

    fn try_from(cmd: SandboxCommand) -> Result<Self, Self::Error> {
        match cmd {
            SandboxCommand::SetCamera { position, target } => Ok(Self::SetCamera { position, target }),
            SandboxCommand::SetRenderMode { mode } => Ok(Self::SetRenderMode { mode }),
            SandboxCommand::ToggleGrid { visible } => Ok(Self::ToggleGrid { visible }),
            other => Err(other),
        }
    }
}

/// Host -> sandbox wire envelope
///
/// `command_id` is present only for tracked commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CommandId>,
    #[serde(flatten)]
    pub command: SandboxCommand,
}

impl Envelope {
    /// Envelope for a tracked command
    #[inline]
    #[must_use]
    pub fn tracked(command_id: CommandId, command: SandboxCommand) -> Self {
        Self {
            command_id: Some(command_id),
            command,
        }
    }

    /// Envelope for an untracked command
    #[inline]
    #[must_use]
    pub fn untracked(command: SandboxCommand) -> Self {
        Self {
            command_id: None,
            command,
        }
    }

    /// Serialize to wire text
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }

    /// Validate wire text into an envelope
    ///
    /// On failure the command id is still recovered when the text carries one,
    /// so the sender can be told its command was rejected.
    pub fn decode(raw: &str) -> Result<Self, RejectedEnvelope> {
        serde_json::from_str(raw).map_err(|err| {
            let command_id = serde_json::from_str::<serde_json::Value>(raw)
                .ok()
                .and_then(|v| v.get("commandId").cloned())
                .and_then(|v| serde_json::from_value::<CommandId>(v).ok());
            let command_type = serde_json::from_str::<serde_json::Value>(raw)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_owned));
            RejectedEnvelope {
                command_id,
                command_type,
                reason: err.to_string(),
            }
        })
    }
}

/// Inbound text that did not validate as an [`Envelope`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEnvelope {
    /// Command id, if one could be recovered
    pub command_id: Option<CommandId>,
    /// Claimed command type, if any
    pub command_type: Option<String>,
    /// Parser diagnostic
    pub reason: String,
}
