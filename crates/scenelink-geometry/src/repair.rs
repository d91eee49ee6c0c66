//! Duplicate-vertex merge and normal recomputation

use crate::buffer::{compute_vertex_normals, Geometry};
use rustc_hash::FxHashMap;

/// Positions closer than this on every axis are merged
pub const MERGE_TOLERANCE: f32 = 1e-4;

/// Merge duplicate vertices and recompute smooth normals
///
/// The first occurrence of a position keeps its slot, so a mesh without
/// duplicates comes back with identical positions and indices. A soup only
/// gains an index buffer when something was welded.
#[must_use]
pub fn repair(geometry: Geometry) -> Geometry {
    let count = geometry.vertex_count();
    let quantize = |v: f32| (v / MERGE_TOLERANCE).round() as i64;

    let mut seen: FxHashMap<(i64, i64, i64), u32> = FxHashMap::default();
    let mut positions = Vec::with_capacity(geometry.positions.len());
    let mut remap = Vec::with_capacity(count);
    for p in geometry.positions.chunks_exact(3) {
        let key = (quantize(p[0]), quantize(p[1]), quantize(p[2]));
        let idx = *seen.entry(key).or_insert_with(|| {
            positions.extend_from_slice(p);
            (positions.len() / 3 - 1) as u32
        });
        remap.push(idx);
    }

    let merged = count - positions.len() / 3;
    let indices = match &geometry.indices {
        Some(idx) => Some(idx.iter().map(|&i| remap[i as usize]).collect()),
        None if merged == 0 => None,
        None => Some(remap),
    };
    tracing::debug!(vertices = count, merged, "repaired geometry");

    let mut out = Geometry::new(positions, indices);
    compute_vertex_normals(&mut out);
    out
}
