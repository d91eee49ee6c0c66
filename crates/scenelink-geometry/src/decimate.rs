//! Vertex-clustering simplification
//!
//! Vertices are snapped to a uniform grid over the mesh bounds and every
//! occupied cell collapses to the average of its vertices. The grid resolution
//! is the largest one whose occupied-cell count stays within the requested
//! target, so the result never has more vertices than asked for.

use crate::buffer::{compute_vertex_normals, Geometry};
use rustc_hash::{FxHashMap, FxHashSet};

/// Finest grid resolution tried per axis
const MAX_RESOLUTION: u32 = 1024;

/// Decimation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecimateParams {
    /// Fraction of vertices to keep
    pub percent: f32,
}

impl DecimateParams {
    /// Create params keeping `percent` of the vertices
    #[inline]
    #[must_use]
    pub fn new(percent: f32) -> Self {
        Self { percent }
    }

    /// Target vertex count for a mesh with `vertex_count` vertices
    #[inline]
    #[must_use]
    pub fn target_for(&self, vertex_count: usize) -> usize {
        if !self.percent.is_finite() || self.percent <= 0.0 {
            return 0;
        }
        (vertex_count as f64 * f64::from(self.percent)).floor() as usize
    }
}

/// Simplify `geometry` towards `percent` of its vertex count
///
/// When the target is not strictly between zero and the current count the
/// input is returned untouched.
#[must_use]
pub fn decimate(geometry: Geometry, params: DecimateParams) -> Geometry {
    let count = geometry.vertex_count();
    let target = params.target_for(count);
    if target == 0 || target >= count {
        tracing::debug!(count, target, "decimate is a no-op");
        return geometry;
    }

    let Some((min, max)) = geometry.bounds() else {
        return geometry;
    };
    let extent = [
        (max.x - min.x).max(f32::EPSILON),
        (max.y - min.y).max(f32::EPSILON),
        (max.z - min.z).max(f32::EPSILON),
    ];
    let origin = [min.x, min.y, min.z];

    let cell_of = |resolution: u32, p: &[f32]| -> (u32, u32, u32) {
        let axis = |a: usize| {
            let t = (p[a] - origin[a]) / extent[a];
            ((t * resolution as f32) as u32).min(resolution - 1)
        };
        (axis(0), axis(1), axis(2))
    };

    let occupied = |resolution: u32| -> usize {
        geometry
            .positions
            .chunks_exact(3)
            .map(|p| cell_of(resolution, p))
            .collect::<FxHashSet<_>>()
            .len()
    };

    // Largest resolution with occupied <= target; resolution 1 always fits.
    let (mut lo, mut hi) = (1u32, MAX_RESOLUTION);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if occupied(mid) <= target {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    let resolution = lo;

    let mut cell_index: FxHashMap<(u32, u32, u32), u32> = FxHashMap::default();
    let mut sums: Vec<[f32; 4]> = Vec::new();
    let mut remap = Vec::with_capacity(count);
    for p in geometry.positions.chunks_exact(3) {
        let cell = cell_of(resolution, p);
        let idx = *cell_index.entry(cell).or_insert_with(|| {
            sums.push([0.0; 4]);
            (sums.len() - 1) as u32
        });
        let s = &mut sums[idx as usize];
        s[0] += p[0];
        s[1] += p[1];
        s[2] += p[2];
        s[3] += 1.0;
        remap.push(idx);
    }

    let positions: Vec<f32> = sums
        .iter()
        .flat_map(|s| [s[0] / s[3], s[1] / s[3], s[2] / s[3]])
        .collect();

    let mut indices = Vec::with_capacity(geometry.triangle_count() * 3);
    for [a, b, c] in geometry.triangles() {
        let (a, b, c) = (remap[a], remap[b], remap[c]);
        if a != b && b != c && a != c {
            indices.extend_from_slice(&[a, b, c]);
        }
    }

    tracing::debug!(
        from = count,
        to = sums.len(),
        target,
        resolution,
        "decimated geometry"
    );

    let mut out = Geometry::new(positions, Some(indices));
    compute_vertex_normals(&mut out);
    out
}
