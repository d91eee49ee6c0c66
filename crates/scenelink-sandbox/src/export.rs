//! Export plugins
//!
//! Encoders receive an [`ExportGroup`]: visible, non-helper meshes (level 0
//! for LOD groups) with world transforms already baked in. Formats are
//! pluggable through [`MeshExporter`]; binary STL and Wavefront OBJ ship by
//! default.

use crate::error::ExportError;
use crate::scene::Scene;
use rustc_hash::FxHashMap;
use scenelink_geometry::Geometry;
use scenelink_protocol::ExportFormat;
use std::fmt::Write as _;
use std::sync::Arc;

/// One mesh of an export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportMesh {
    pub name: String,
    pub color: u32,
    /// World-space geometry
    pub geometry: Geometry,
}

/// Cleaned scene handed to an exporter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportGroup {
    pub meshes: Vec<ExportMesh>,
}

impl ExportGroup {
    /// Collect the exportable part of `scene`
    #[must_use]
    pub fn from_scene(scene: &Scene) -> Self {
        let meshes = scene
            .objects()
            .filter(|o| o.visible)
            .filter_map(|o| {
                Some(ExportMesh {
                    name: o.name.clone(),
                    color: o.material.color,
                    geometry: o.world_geometry()?,
                })
            })
            .collect();
        Self { meshes }
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.geometry.triangle_count()).sum()
    }

    /// Every triangle of every mesh as corner positions
    pub fn triangles(&self) -> impl Iterator<Item = [[f32; 3]; 3]> + '_ {
        self.meshes.iter().flat_map(|m| {
            let g = &m.geometry;
            g.triangles().map(move |tri| {
                tri.map(|i| {
                    let p = g.position(i);
                    [p.x, p.y, p.z]
                })
            })
        })
    }
}

/// Format encoder
pub trait MeshExporter: Send + Sync {
    fn format(&self) -> ExportFormat;

    fn encode(&self, group: &ExportGroup) -> Result<Vec<u8>, ExportError>;
}

/// Binary STL
#[derive(Debug, Clone, Copy, Default)]
pub struct StlExporter;

impl StlExporter {
    const HEADER: &'static str = "scenelink binary stl";
}

fn face_normal(tri: &[[f32; 3]; 3]) -> [f32; 3] {
    let [a, b, c] = tri;
    let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let ac = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [
        ab[1] * ac[2] - ab[2] * ac[1],
        ab[2] * ac[0] - ab[0] * ac[2],
        ab[0] * ac[1] - ab[1] * ac[0],
    ];
    let len2 = n[0] * n[0] + n[1] * n[1] + n[2] * n[2];
    if len2 <= f32::EPSILON {
        return [0.0; 3];
    }
    let inv = 1.0 / len2.sqrt();
    [n[0] * inv, n[1] * inv, n[2] * inv]
}

impl MeshExporter for StlExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Stl
    }

    fn encode(&self, group: &ExportGroup) -> Result<Vec<u8>, ExportError> {
        let count = group.triangle_count();
        let count_u32 = u32::try_from(count).map_err(|_| ExportError::Encode {
            format: "stl",
            reason: format!("{count} triangles exceed the binary STL limit"),
        })?;

        let mut out = Vec::with_capacity(84 + count * 50);
        let mut header = [0u8; 80];
        let name = Self::HEADER.as_bytes();
        header[..name.len()].copy_from_slice(name);
        out.extend_from_slice(&header);
        out.extend_from_slice(&count_u32.to_le_bytes());

        for tri in group.triangles() {
            for value in face_normal(&tri) {
                out.extend_from_slice(&value.to_le_bytes());
            }
            for corner in tri {
                for value in corner {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        Ok(out)
    }
}

/// Wavefront OBJ, one `o` block per mesh
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjExporter;

impl MeshExporter for ObjExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Obj
    }

    fn encode(&self, group: &ExportGroup) -> Result<Vec<u8>, ExportError> {
        let mut text = String::from("# scenelink\n");
        let mut base = 1usize;
        for mesh in &group.meshes {
            let g = &mesh.geometry;
            // Writing to a String cannot fail
            let _ = writeln!(text, "o {}", mesh.name.replace(char::is_whitespace, "_"));
            for p in g.positions.chunks_exact(3) {
                let _ = writeln!(text, "v {} {} {}", p[0], p[1], p[2]);
            }
            for [a, b, c] in g.triangles() {
                let _ = writeln!(text, "f {} {} {}", a + base, b + base, c + base);
            }
            base += g.vertex_count();
        }
        Ok(text.into_bytes())
    }
}

/// Registered exporters by format
#[derive(Clone, Default)]
pub struct ExporterRegistry {
    exporters: FxHashMap<ExportFormat, Arc<dyn MeshExporter>>,
}

impl std::fmt::Debug for ExporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterRegistry")
            .field("formats", &self.exporters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExporterRegistry {
    /// Registry with the built-in STL and OBJ exporters
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(StlExporter));
        registry.register(Arc::new(ObjExporter));
        registry
    }

    /// Add or replace the exporter for its format
    pub fn register(&mut self, exporter: Arc<dyn MeshExporter>) {
        self.exporters.insert(exporter.format(), exporter);
    }

    /// Encode `group` in `format`
    pub fn export(&self, format: ExportFormat, group: &ExportGroup) -> Result<Vec<u8>, ExportError> {
        let exporter = self
            .exporters
            .get(&format)
            .ok_or(ExportError::Unsupported(format))?;
        exporter.encode(group)
    }
}
