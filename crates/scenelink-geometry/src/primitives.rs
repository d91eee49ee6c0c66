//! Primitive mesh builders
//!
//! All primitives are centred on the origin with unit size and carry normals.

use crate::buffer::{compute_vertex_normals, Geometry};
use std::f32::consts::{PI, TAU};

/// Default segment count for curved primitives
pub const DEFAULT_DETAIL: u32 = 32;

/// Unit cube with per-face vertices (24 vertices, 12 triangles)
#[must_use]
pub fn cube() -> Geometry {
    // (normal axis, sign) for each face; u/v are the two remaining axes
    const FACES: [(usize, f32); 6] = [(0, 1.0), (0, -1.0), (1, 1.0), (1, -1.0), (2, 1.0), (2, -1.0)];
    let mut positions = Vec::with_capacity(24 * 3);
    let mut normals = Vec::with_capacity(24 * 3);
    let mut indices = Vec::with_capacity(36);

    for (axis, sign) in FACES {
        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;
        let base = (positions.len() / 3) as u32;
        for (du, dv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            let mut p = [0.0f32; 3];
            p[axis] = 0.5 * sign;
            p[u] = du * sign;
            p[v] = dv;
            positions.extend_from_slice(&p);
            let mut n = [0.0f32; 3];
            n[axis] = sign;
            normals.extend_from_slice(&n);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Geometry {
        positions,
        indices: Some(indices),
        normals: Some(normals),
    }
}

/// UV sphere of radius 0.5
#[must_use]
pub fn sphere(detail: u32) -> Geometry {
    let width = detail.max(3);
    let height = (detail / 2).max(2);
    let mut positions = Vec::new();
    for y in 0..=height {
        let theta = y as f32 / height as f32 * PI;
        for x in 0..=width {
            let phi = x as f32 / width as f32 * TAU;
            positions.extend_from_slice(&[
                -0.5 * phi.cos() * theta.sin(),
                0.5 * theta.cos(),
                0.5 * phi.sin() * theta.sin(),
            ]);
        }
    }
    let mut indices = Vec::new();
    let row = width + 1;
    for y in 0..height {
        for x in 0..width {
            let a = y * row + x;
            let b = a + row;
            if y != 0 {
                indices.extend_from_slice(&[a + 1, a, b + 1]);
            }
            if y != height - 1 {
                indices.extend_from_slice(&[a, b, b + 1]);
            }
        }
    }
    let mut g = Geometry::new(positions, Some(indices));
    compute_vertex_normals(&mut g);
    g
}

/// Capped cylinder of radius 0.5 and height 1
#[must_use]
pub fn cylinder(detail: u32) -> Geometry {
    let segments = detail.max(3);
    let mut positions = Vec::new();
    let mut indices = Vec::new();

    // Side: two rings
    for y in [-0.5f32, 0.5] {
        for s in 0..=segments {
            let a = s as f32 / segments as f32 * TAU;
            positions.extend_from_slice(&[0.5 * a.sin(), y, 0.5 * a.cos()]);
        }
    }
    let row = segments + 1;
    for s in 0..segments {
        let (a, b) = (s, s + row);
        indices.extend_from_slice(&[b, a, b + 1, a, a + 1, b + 1]);
    }

    // Caps: centre + ring each
    for (y, flip) in [(-0.5f32, true), (0.5, false)] {
        let centre = (positions.len() / 3) as u32;
        positions.extend_from_slice(&[0.0, y, 0.0]);
        for s in 0..=segments {
            let a = s as f32 / segments as f32 * TAU;
            positions.extend_from_slice(&[0.5 * a.sin(), y, 0.5 * a.cos()]);
        }
        for s in 0..segments {
            let (i, j) = (centre + 1 + s, centre + 2 + s);
            if flip {
                indices.extend_from_slice(&[centre, j, i]);
            } else {
                indices.extend_from_slice(&[centre, i, j]);
            }
        }
    }

    let mut g = Geometry::new(positions, Some(indices));
    compute_vertex_normals(&mut g);
    g
}

/// Unit square in the XZ plane facing +Y
#[must_use]
pub fn plane() -> Geometry {
    Geometry {
        positions: vec![-0.5, 0.0, 0.5, 0.5, 0.0, 0.5, 0.5, 0.0, -0.5, -0.5, 0.0, -0.5],
        indices: Some(vec![0, 1, 2, 0, 2, 3]),
        normals: Some(vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0]),
    }
}

/// Ring torus with major radius 0.4 and tube radius 0.1
#[must_use]
pub fn torus(detail: u32) -> Geometry {
    const MAJOR: f32 = 0.4;
    const TUBE: f32 = 0.1;
    let radial = (detail / 2).max(3);
    let tubular = detail.max(3);
    let mut positions = Vec::new();
    for j in 0..=radial {
        let v = j as f32 / radial as f32 * TAU;
        for i in 0..=tubular {
            let u = i as f32 / tubular as f32 * TAU;
            positions.extend_from_slice(&[
                (MAJOR + TUBE * v.cos()) * u.cos(),
                (MAJOR + TUBE * v.cos()) * u.sin(),
                TUBE * v.sin(),
            ]);
        }
    }
    let mut indices = Vec::new();
    let row = tubular + 1;
    for j in 1..=radial {
        for i in 1..=tubular {
            let a = row * j + i - 1;
            let b = row * (j - 1) + i - 1;
            let c = row * (j - 1) + i;
            let d = row * j + i;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }
    let mut g = Geometry::new(positions, Some(indices));
    compute_vertex_normals(&mut g);
    g
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_shape() {
        let g = cube();
        assert_eq!(g.vertex_count(), 24);
        assert_eq!(g.triangle_count(), 12);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn sphere_vertex_count_follows_detail() {
        let g = sphere(16);
        assert_eq!(g.vertex_count(), 17 * 9);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn curved_primitives_validate() {
        for g in [cylinder(12), torus(12), plane()] {
            assert!(g.validate().is_ok());
            assert!(g.normals.is_some());
        }
    }

    #[test]
    fn cube_outward_normals() {
        let g = cube();
        let normals = g.normals.as_ref().unwrap();
        for (p, n) in g.positions.chunks_exact(3).zip(normals.chunks_exact(3)) {
            let dot = p[0] * n[0] + p[1] * n[1] + p[2] * n[2];
            assert!(dot > 0.0);
        }
    }
}
