//! Testing utilities for the scenelink workspace
//!
//! Shared fixtures: dense meshes, scripted boolean kernels, fast configs.

#![allow(missing_docs)]

use scenelink_geometry::Geometry;
use scenelink_protocol::BooleanOp;
use scenelink_sandbox::{BooleanEvaluator, Brush, CsgError, LodConfig, SandboxConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Indexed `n x n` vertex grid with a wavy height field
///
/// `grid_mesh(100)` has exactly 10 000 vertices.
#[must_use]
pub fn grid_mesh(n: usize) -> Geometry {
    assert!(n >= 2, "grid needs at least 2x2 vertices");
    let mut positions = Vec::with_capacity(n * n * 3);
    for y in 0..n {
        for x in 0..n {
            positions.extend_from_slice(&[
                x as f32 * 0.1,
                y as f32 * 0.1,
                ((x + y) as f32 * 0.3).sin() * 0.2,
            ]);
        }
    }

    let side = n as u32;
    let mut indices = Vec::with_capacity((n - 1) * (n - 1) * 6);
    for y in 0..side - 1 {
        for x in 0..side - 1 {
            let i = y * side + x;
            indices.extend_from_slice(&[i, i + 1, i + side, i + 1, i + side + 1, i + side]);
        }
    }
    Geometry::new(positions, Some(indices))
}

/// Boolean kernel that skips the math
///
/// Union concatenates both brushes; subtract and intersect return the
/// target unchanged. Counts its calls.
#[derive(Debug, Default)]
pub struct StubEvaluator {
    calls: AtomicUsize,
}

impl StubEvaluator {
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BooleanEvaluator for StubEvaluator {
    fn evaluate(&self, op: BooleanOp, target: &Brush, tool: &Brush) -> Result<Brush, CsgError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut geometry = target.geometry.clone();
        if op == BooleanOp::Union {
            geometry.merge(&tool.geometry);
        }
        Ok(Brush { geometry })
    }
}

/// Boolean kernel that always fails
#[derive(Debug, Clone)]
pub struct FailingEvaluator {
    pub message: String,
}

impl Default for FailingEvaluator {
    fn default() -> Self {
        Self {
            message: "kernel exploded".to_owned(),
        }
    }
}

impl BooleanEvaluator for FailingEvaluator {
    fn evaluate(&self, _op: BooleanOp, _target: &Brush, _tool: &Brush) -> Result<Brush, CsgError> {
        Err(CsgError::Kernel(self.message.clone()))
    }
}

/// Sandbox settings with a short broadcast debounce
#[must_use]
pub fn fast_sandbox_config() -> SandboxConfig {
    SandboxConfig {
        broadcast_debounce: Duration::from_millis(10),
        ..SandboxConfig::default()
    }
}

/// LOD settings with a lowered vertex threshold
#[must_use]
pub fn low_threshold_lod(vertex_threshold: usize) -> LodConfig {
    LodConfig {
        vertex_threshold,
        ..LodConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_has_n_squared_vertices() {
        let grid = grid_mesh(100);
        assert_eq!(grid.vertex_count(), 10_000);
        assert_eq!(grid.triangle_count(), 99 * 99 * 2);
        assert!(grid.validate().is_ok());
    }

    #[test]
    fn stub_union_concatenates() {
        let a = Brush {
            geometry: grid_mesh(2),
        };
        let b = a.clone();
        let evaluator = StubEvaluator::default();
        let out = evaluator.evaluate(BooleanOp::Union, &a, &b).unwrap();
        assert_eq!(out.geometry.vertex_count(), 8);
        assert_eq!(evaluator.calls(), 1);
    }
}
