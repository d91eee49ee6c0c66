//! Geometry buffers
//!
//! [`Geometry`] is the sandbox-side mesh: flat `f32` positions, optional `u32`
//! triangle indices and optional per-vertex normals. [`TransferBuffer`] is the
//! move-only wrapper used when a buffer changes owner between the sandbox and
//! the geometry worker.

use crate::error::GeometryError;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// Numeric buffer whose ownership moves between execution contexts
///
/// Deliberately not `Clone`: handing a `TransferBuffer` to another context
/// consumes it, so the sender cannot observe the buffer afterwards. Copying
/// out of a live buffer is the explicit [`TransferBuffer::copy_from`] step.
#[derive(Debug, PartialEq)]
pub struct TransferBuffer<T> {
    data: Vec<T>,
}

impl<T> TransferBuffer<T> {
    /// Wrap an owned vector
    #[inline]
    #[must_use]
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }

    /// Number of elements
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the contents
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Take ownership of the contents
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<T> {
        self.data
    }
}

impl<T: Clone> TransferBuffer<T> {
    /// Copy a live array into a fresh buffer that can be transferred
    #[inline]
    #[must_use]
    pub fn copy_from(slice: &[T]) -> Self {
        Self {
            data: slice.to_vec(),
        }
    }
}

/// Triangle mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    /// Vertex positions (x, y, z)
    pub positions: Vec<f32>,
    /// Triangle indices (i0, i1, i2); `None` means consecutive vertex triples
    pub indices: Option<Vec<u32>>,
    /// Vertex normals (nx, ny, nz)
    pub normals: Option<Vec<f32>>,
}

impl Geometry {
    /// Create from raw buffers
    #[inline]
    #[must_use]
    pub fn new(positions: Vec<f32>, indices: Option<Vec<u32>>) -> Self {
        Self {
            positions,
            indices,
            normals: None,
        }
    }

    /// Number of vertices
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Number of triangles
    #[inline]
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len() / 3,
            None => self.vertex_count() / 3,
        }
    }

    /// Check if the mesh has no vertices
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Position of vertex `i`
    #[inline]
    #[must_use]
    pub fn position(&self, i: usize) -> Point3<f32> {
        Point3::new(
            self.positions[i * 3],
            self.positions[i * 3 + 1],
            self.positions[i * 3 + 2],
        )
    }

    /// Triangle corner indices, synthesizing them for non-indexed meshes
    pub fn triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let count = self.triangle_count();
        (0..count).map(move |t| match &self.indices {
            Some(idx) => [
                idx[t * 3] as usize,
                idx[t * 3 + 1] as usize,
                idx[t * 3 + 2] as usize,
            ],
            None => [t * 3, t * 3 + 1, t * 3 + 2],
        })
    }

    /// Check buffer shapes and index bounds
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.positions.len() % 3 != 0 {
            return Err(GeometryError::MalformedPositions(self.positions.len()));
        }
        let vertex_count = self.vertex_count();
        if let Some(indices) = &self.indices {
            if indices.len() % 3 != 0 {
                return Err(GeometryError::MalformedIndices(indices.len()));
            }
            if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(GeometryError::IndexOutOfRange {
                    index: bad,
                    vertex_count,
                });
            }
        } else if vertex_count % 3 != 0 {
            return Err(GeometryError::MalformedPositions(self.positions.len()));
        }
        if let Some(normals) = &self.normals {
            if normals.len() != self.positions.len() {
                return Err(GeometryError::NormalCountMismatch {
                    normals: normals.len(),
                    positions: self.positions.len(),
                });
            }
        }
        Ok(())
    }

    /// Axis-aligned bounds, `None` for an empty mesh
    #[must_use]
    pub fn bounds(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        if self.is_empty() {
            return None;
        }
        let mut min = Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
        let mut max = Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in self.positions.chunks_exact(3) {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        Some((min, max))
    }

    /// Bake a world transform into positions and normals
    pub fn apply_matrix(&mut self, matrix: &Matrix4<f32>) {
        for p in self.positions.chunks_exact_mut(3) {
            let out = matrix.transform_point(&Point3::new(p[0], p[1], p[2]));
            p.copy_from_slice(&[out.x, out.y, out.z]);
        }
        if let Some(normals) = self.normals.as_mut() {
            let linear: Matrix3<f32> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
            let normal_matrix = linear
                .try_inverse()
                .map_or_else(Matrix3::identity, |inv| inv.transpose());
            for n in normals.chunks_exact_mut(3) {
                let v = (normal_matrix * Vector3::new(n[0], n[1], n[2]))
                    .try_normalize(1e-12)
                    .unwrap_or_else(Vector3::zeros);
                n.copy_from_slice(&[v.x, v.y, v.z]);
            }
        }
    }

    /// Append another mesh, converting both to indexed form
    pub fn merge(&mut self, other: &Geometry) {
        let base = self.vertex_count() as u32;
        let mut indices = self
            .indices
            .take()
            .unwrap_or_else(|| (0..base).collect());
        match &other.indices {
            Some(idx) => indices.extend(idx.iter().map(|i| i + base)),
            None => indices.extend((0..other.vertex_count() as u32).map(|i| i + base)),
        }
        let merged_normals = match (self.normals.take(), &other.normals) {
            (Some(mut a), Some(b)) => {
                a.extend_from_slice(b);
                Some(a)
            }
            _ => None,
        };
        self.positions.extend_from_slice(&other.positions);
        self.indices = Some(indices);
        self.normals = merged_normals;
    }
}

/// Recompute smooth vertex normals from face normals
pub fn compute_vertex_normals(geometry: &mut Geometry) {
    let vertex_count = geometry.vertex_count();
    if vertex_count == 0 {
        geometry.normals = None;
        return;
    }

    let mut accum = vec![Vector3::<f32>::zeros(); vertex_count];
    for [i0, i1, i2] in geometry.triangles() {
        let v0 = geometry.position(i0);
        let v1 = geometry.position(i1);
        let v2 = geometry.position(i2);
        // Area-weighted: the unnormalized cross product
        let face = (v1 - v0).cross(&(v2 - v0));
        accum[i0] += face;
        accum[i1] += face;
        accum[i2] += face;
    }

    let mut normals = Vec::with_capacity(vertex_count * 3);
    for n in accum {
        let n = n.try_normalize(1e-12).unwrap_or_else(Vector3::zeros);
        normals.extend_from_slice(&[n.x, n.y, n.z]);
    }
    geometry.normals = Some(normals);
}
