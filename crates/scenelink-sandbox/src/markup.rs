//! Scene markup accepted by `loadScene`
//!
//! The scene generator produces a JSON document:
//!
//! ```json
//! { "objects": [ { "name": "Table top", "primitive": "box",
//!                  "position": [0, 1, 0], "scale": [2, 0.1, 1], "color": 9127187 } ] }
//! ```

use crate::error::SandboxError;
use crate::scene::{Material, Transform};
use scenelink_protocol::{PrimitiveKind, Vec3};
use serde::Deserialize;

/// Parsed scene document
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneDocument {
    pub objects: Vec<SceneEntry>,
}

/// One object of a scene document
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SceneEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub primitive: PrimitiveKind,
    #[serde(default)]
    pub position: Option<Vec3>,
    #[serde(default)]
    pub rotation: Option<Vec3>,
    #[serde(default)]
    pub scale: Option<Vec3>,
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub detail: Option<u32>,
}

impl SceneDocument {
    pub fn parse(markup: &str) -> Result<Self, SandboxError> {
        serde_json::from_str(markup).map_err(|e| SandboxError::Markup(e.to_string()))
    }
}

impl SceneEntry {
    /// Display name, falling back to the primitive's label
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.primitive.label().to_owned())
    }

    #[must_use]
    pub fn transform(&self) -> Transform {
        let mut transform = Transform::default();
        transform.update(self.position, self.rotation, self.scale);
        transform
    }

    #[must_use]
    pub fn material(&self) -> Material {
        self.color.map_or_else(Material::default, Material::colored)
    }
}
