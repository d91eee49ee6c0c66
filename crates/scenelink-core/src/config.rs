//! Bridge configuration
//!
//! One TOML document with a section per component:
//!
//! ```toml
//! [gateway]
//! timeout_ms = 30000
//! retries = 0
//! retry_delay_ms = 500
//!
//! [sandbox]
//! broadcast_debounce_ms = 200
//! channel_capacity = 256
//!
//! [lod]
//! vertex_threshold = 5000
//! levels = [{ ratio = 0.5, distance = 50.0 }, { ratio = 0.2, distance = 150.0 }]
//! ```
//!
//! Every key is optional; missing keys take the defaults above.

use crate::error::ConfigError;
use scenelink_gateway::GatewayConfig;
use scenelink_sandbox::{LodConfig, LodLevelSpec, SandboxConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete session configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub gateway: GatewaySection,
    pub sandbox: SandboxSection,
    pub lod: LodSection,
}

/// Command gateway settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewaySection {
    /// Ack timeout per attempt
    pub timeout_ms: u64,
    /// Extra attempts after the first
    pub retries: u32,
    /// Pause between attempts
    pub retry_delay_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retries: 0,
            retry_delay_ms: 500,
        }
    }
}

/// Sandbox runtime settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxSection {
    /// Quiet period before a scene-graph broadcast
    pub broadcast_debounce_ms: u64,
    /// Inbound queue depth
    pub channel_capacity: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            broadcast_debounce_ms: 200,
            channel_capacity: 256,
        }
    }
}

/// LOD synthesis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LodSection {
    /// Meshes with more vertices than this get a LOD group
    pub vertex_threshold: usize,
    /// Generated levels, nearest first
    pub levels: Vec<LodLevelEntry>,
}

/// One generated LOD level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LodLevelEntry {
    /// Fraction of vertices kept, in (0, 1)
    pub ratio: f32,
    /// Camera distance at which the level takes over
    pub distance: f32,
}

impl Default for LodSection {
    fn default() -> Self {
        let defaults = LodConfig::default();
        Self {
            vertex_threshold: defaults.vertex_threshold,
            levels: defaults
                .levels
                .iter()
                .map(|l| LodLevelEntry {
                    ratio: l.percent,
                    distance: l.distance,
                })
                .collect(),
        }
    }
}

impl BridgeConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With gateway ack timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.gateway.timeout_ms = timeout_ms;
        self
    }

    /// With gateway retry budget
    #[inline]
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.gateway.retries = retries;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.gateway.retry_delay_ms = retry_delay_ms;
        self
    }

    /// With scene-graph broadcast debounce
    #[inline]
    #[must_use]
    pub fn with_broadcast_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.sandbox.broadcast_debounce_ms = debounce_ms;
        self
    }

    /// With LOD vertex threshold
    #[inline]
    #[must_use]
    pub fn with_vertex_threshold(mut self, vertex_threshold: usize) -> Self {
        self.lod.vertex_threshold = vertex_threshold;
        self
    }

    /// Parse a TOML document and validate it
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.timeout_ms == 0 {
            return Err(ConfigError::Invalid("gateway.timeout_ms must be positive".into()));
        }
        if self.sandbox.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.channel_capacity must be positive".into(),
            ));
        }
        for (i, level) in self.lod.levels.iter().enumerate() {
            if !(level.ratio > 0.0 && level.ratio < 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "lod.levels[{i}].ratio must be in (0, 1), got {}",
                    level.ratio
                )));
            }
            if !level.distance.is_finite() || level.distance <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "lod.levels[{i}].distance must be positive"
                )));
            }
        }
        if self
            .lod
            .levels
            .windows(2)
            .any(|w| w[1].distance <= w[0].distance)
        {
            return Err(ConfigError::Invalid(
                "lod.levels must have strictly increasing distances".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            timeout: Duration::from_millis(self.gateway.timeout_ms),
            retries: self.gateway.retries,
            retry_delay: Duration::from_millis(self.gateway.retry_delay_ms),
        }
    }

    #[must_use]
    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            broadcast_debounce: Duration::from_millis(self.sandbox.broadcast_debounce_ms),
            channel_capacity: self.sandbox.channel_capacity,
            lod: LodConfig {
                vertex_threshold: self.lod.vertex_threshold,
                levels: self
                    .lod
                    .levels
                    .iter()
                    .map(|l| LodLevelSpec {
                        percent: l.ratio,
                        distance: l.distance,
                    })
                    .collect(),
            },
        }
    }
}
