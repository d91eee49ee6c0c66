//! Scene model owned by the sandbox runtime
//!
//! Objects are kept in insertion order. Helpers (the ground grid and the
//! transform gizmo) live in the same table but never appear in the host
//! mirror, stats, exports or selection.

use crate::error::SandboxError;
use indexmap::IndexMap;
use nalgebra::{Matrix4, Rotation3, Vector3};
use scenelink_geometry::{primitives, Geometry};
use scenelink_protocol::{ObjectId, PrimitiveKind, SceneNode, SceneNodeKind, SceneStats, Vec3};
use smallvec::SmallVec;

/// Default mesh colour (0xRRGGBB)
pub const DEFAULT_COLOR: u32 = 0x88_99_aa;

/// Position, Euler rotation (XYZ, radians) and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::repeat(1.0),
        }
    }
}

impl Transform {
    /// Identity transform moved to `position`
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            position: Vector3::from(position),
            ..Self::default()
        }
    }

    /// Overwrite whichever components are given
    pub fn update(&mut self, position: Option<Vec3>, rotation: Option<Vec3>, scale: Option<Vec3>) {
        if let Some(p) = position {
            self.position = Vector3::from(p);
        }
        if let Some(r) = rotation {
            self.rotation = Vector3::from(r);
        }
        if let Some(s) = scale {
            self.scale = Vector3::from(s);
        }
    }

    /// World matrix: translate * rotate * scale
    #[must_use]
    pub fn matrix(&self) -> Matrix4<f32> {
        let rotation =
            Rotation3::from_euler_angles(self.rotation.x, self.rotation.y, self.rotation.z);
        Matrix4::new_translation(&self.position)
            * rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }
}

/// Surface material
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub color: u32,
    pub roughness: f32,
    pub metalness: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR,
            roughness: 0.5,
            metalness: 0.1,
        }
    }
}

impl Material {
    /// Default material in the given colour
    #[must_use]
    pub fn colored(color: u32) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }
}

/// One level of detail
#[derive(Debug, Clone, PartialEq)]
pub struct LodLevel {
    pub geometry: Geometry,
    /// Camera distance from which this level is shown
    pub distance: f32,
}

/// Distance-ordered set of renderings of one mesh
///
/// Level 0 is the original geometry at distance 0 and is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct LodGroup {
    levels: SmallVec<[LodLevel; 3]>,
}

impl LodGroup {
    /// Group holding only the original geometry
    #[must_use]
    pub fn new(original: Geometry) -> Self {
        let mut levels = SmallVec::new();
        levels.push(LodLevel {
            geometry: original,
            distance: 0.0,
        });
        Self { levels }
    }

    /// Insert a level at its distance-sorted slot
    ///
    /// A level already present at the same distance is replaced.
    pub fn insert_level(&mut self, geometry: Geometry, distance: f32) {
        let level = LodLevel { geometry, distance };
        if let Some(existing) = self.levels.iter_mut().find(|l| l.distance == distance) {
            *existing = level;
            return;
        }
        let slot = self
            .levels
            .iter()
            .position(|l| l.distance > distance)
            .unwrap_or(self.levels.len());
        self.levels.insert(slot, level);
    }

    /// Original geometry
    #[must_use]
    pub fn base(&self) -> &Geometry {
        &self.levels[0].geometry
    }

    /// All levels, nearest first
    #[must_use]
    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    /// Switch distances, nearest first
    #[must_use]
    pub fn distances(&self) -> Vec<f32> {
        self.levels.iter().map(|l| l.distance).collect()
    }
}

/// Non-renderable scene furniture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperKind {
    Grid,
    Gizmo,
}

/// What a scene object holds
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Mesh(Geometry),
    Lod(LodGroup),
    Helper(HelperKind),
}

/// Scene object
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub id: ObjectId,
    pub name: String,
    pub kind: ObjectKind,
    pub transform: Transform,
    pub material: Material,
    pub visible: bool,
    /// Bumped whenever the geometry is replaced
    pub revision: u64,
}

impl SceneObject {
    /// Visible mesh object with a fresh id
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            id: ObjectId::new(),
            name: name.into(),
            kind,
            transform: Transform::default(),
            material: Material::default(),
            visible: true,
            revision: 0,
        }
    }

    /// Set the transform
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Set the material
    #[must_use]
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_helper(&self) -> bool {
        matches!(self.kind, ObjectKind::Helper(_))
    }

    /// Mesh used for editing: the mesh itself, or level 0 of a LOD group
    #[must_use]
    pub fn renderable(&self) -> Option<&Geometry> {
        match &self.kind {
            ObjectKind::Mesh(g) => Some(g),
            ObjectKind::Lod(group) => Some(group.base()),
            ObjectKind::Helper(_) => None,
        }
    }

    #[must_use]
    pub fn lod(&self) -> Option<&LodGroup> {
        match &self.kind {
            ObjectKind::Lod(group) => Some(group),
            _ => None,
        }
    }

    /// Geometry with the current world transform baked in
    #[must_use]
    pub fn world_geometry(&self) -> Option<Geometry> {
        let mut geometry = self.renderable()?.clone();
        geometry.apply_matrix(&self.transform.matrix());
        Some(geometry)
    }

    fn node(&self, selected: bool) -> Option<SceneNode> {
        let kind = match self.kind {
            ObjectKind::Mesh(_) => SceneNodeKind::Mesh,
            ObjectKind::Lod(_) => SceneNodeKind::Lod,
            ObjectKind::Helper(_) => return None,
        };
        Some(SceneNode {
            id: self.id,
            name: self.name.clone(),
            kind,
            visible: self.visible,
            selected,
        })
    }
}

/// Geometry for a primitive command
#[must_use]
pub fn primitive_geometry(kind: PrimitiveKind, detail: u32) -> Geometry {
    match kind {
        PrimitiveKind::Box => primitives::cube(),
        PrimitiveKind::Sphere => primitives::sphere(detail),
        PrimitiveKind::Cylinder => primitives::cylinder(detail),
        PrimitiveKind::Plane => primitives::plane(),
        PrimitiveKind::Torus => primitives::torus(detail),
    }
}

/// The sandbox scene
#[derive(Debug, Clone)]
pub struct Scene {
    objects: IndexMap<ObjectId, SceneObject>,
    selection: Option<ObjectId>,
    grid: ObjectId,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Empty scene with the grid and gizmo helpers
    #[must_use]
    pub fn new() -> Self {
        let mut objects = IndexMap::new();
        let grid = SceneObject::new("grid", ObjectKind::Helper(HelperKind::Grid));
        let gizmo = SceneObject {
            visible: false,
            ..SceneObject::new("gizmo", ObjectKind::Helper(HelperKind::Gizmo))
        };
        let grid_id = grid.id;
        objects.insert(grid.id, grid);
        objects.insert(gizmo.id, gizmo);
        Self {
            objects,
            selection: None,
            grid: grid_id,
        }
    }

    /// Add an object, returning its id
    pub fn insert(&mut self, object: SceneObject) -> ObjectId {
        let id = object.id;
        self.objects.insert(id, object);
        id
    }

    /// Live non-helper object
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id).filter(|o| !o.is_helper())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(&id).filter(|o| !o.is_helper())
    }

    /// Like [`Scene::get`], failing with `ObjectNotFound`
    pub fn require(&self, id: ObjectId) -> Result<&SceneObject, SandboxError> {
        self.get(id).ok_or(SandboxError::ObjectNotFound(id))
    }

    pub fn require_mut(&mut self, id: ObjectId) -> Result<&mut SceneObject, SandboxError> {
        self.get_mut(id).ok_or(SandboxError::ObjectNotFound(id))
    }

    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Current revision of a live object
    #[must_use]
    pub fn revision(&self, id: ObjectId) -> Option<u64> {
        self.get(id).map(|o| o.revision)
    }

    /// Remove an object, clearing the selection if it pointed there
    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        if !self.contains(id) {
            return None;
        }
        if self.selection == Some(id) {
            self.selection = None;
        }
        self.objects.shift_remove(&id)
    }

    /// Remove every non-helper object
    pub fn clear(&mut self) {
        self.objects.retain(|_, o| o.is_helper());
        self.selection = None;
    }

    /// Currently selected object
    #[inline]
    #[must_use]
    pub fn selection(&self) -> Option<ObjectId> {
        self.selection
    }

    /// Sole selection setter
    ///
    /// Returns whether the selection changed. Selecting a missing object
    /// fails and leaves the selection as it was.
    pub fn select(&mut self, id: Option<ObjectId>) -> Result<bool, SandboxError> {
        if let Some(id) = id {
            self.require(id)?;
        }
        let changed = self.selection != id;
        self.selection = id;
        Ok(changed)
    }

    #[must_use]
    pub fn grid_visible(&self) -> bool {
        self.objects.get(&self.grid).is_some_and(|g| g.visible)
    }

    /// Show or hide the ground grid; returns whether anything changed
    pub fn set_grid_visible(&mut self, visible: bool) -> bool {
        match self.objects.get_mut(&self.grid) {
            Some(grid) if grid.visible != visible => {
                grid.visible = visible;
                true
            }
            _ => false,
        }
    }

    /// Non-helper objects in insertion order
    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> + '_ {
        self.objects.values().filter(|o| !o.is_helper())
    }

    /// Number of non-helper objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Host mirror of the scene graph, helpers excluded
    #[must_use]
    pub fn snapshot(&self) -> Vec<SceneNode> {
        self.objects()
            .filter_map(|o| o.node(self.selection == Some(o.id)))
            .collect()
    }

    /// Geometry counters over renderable objects
    #[must_use]
    pub fn stats(&self) -> SceneStats {
        self.objects().fold(SceneStats::default(), |mut acc, o| {
            acc.objects += 1;
            if let Some(g) = o.renderable() {
                acc.vertices += g.vertex_count();
                acc.triangles += g.triangle_count();
            }
            if o.lod().is_some() {
                acc.lod_groups += 1;
            }
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(name: &str) -> SceneObject {
        SceneObject::new(name, ObjectKind::Mesh(primitives::cube()))
    }

    #[test]
    fn snapshot_excludes_helpers() {
        let mut scene = Scene::new();
        assert!(scene.snapshot().is_empty());

        let id = scene.insert(mesh("Box"));
        let nodes = scene.snapshot();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, id);
        assert_eq!(nodes[0].kind, SceneNodeKind::Mesh);
    }

    #[test]
    fn helpers_cannot_be_selected_or_removed() {
        let mut scene = Scene::new();
        let grid = scene.grid;
        assert!(scene.select(Some(grid)).is_err());
        assert!(scene.remove(grid).is_none());
        assert!(scene.grid_visible());
    }

    #[test]
    fn removing_selected_object_clears_selection() {
        let mut scene = Scene::new();
        let id = scene.insert(mesh("Box"));
        assert!(scene.select(Some(id)).unwrap());
        assert!(!scene.select(Some(id)).unwrap());

        scene.remove(id);
        assert_eq!(scene.selection(), None);
    }

    #[test]
    fn selecting_missing_object_keeps_selection() {
        let mut scene = Scene::new();
        let id = scene.insert(mesh("Box"));
        scene.select(Some(id)).unwrap();

        let err = scene.select(Some(ObjectId::new())).unwrap_err();
        assert!(matches!(err, SandboxError::ObjectNotFound(_)));
        assert_eq!(scene.selection(), Some(id));
    }

    #[test]
    fn clear_keeps_helpers() {
        let mut scene = Scene::new();
        scene.insert(mesh("a"));
        scene.insert(mesh("b"));
        scene.clear();
        assert!(scene.is_empty());
        assert!(scene.grid_visible());
    }

    #[test]
    fn grid_toggle_reports_changes() {
        let mut scene = Scene::new();
        assert!(scene.set_grid_visible(false));
        assert!(!scene.set_grid_visible(false));
        assert!(!scene.grid_visible());
    }

    #[test]
    fn lod_levels_stay_sorted() {
        let mut group = LodGroup::new(primitives::cube());
        group.insert_level(primitives::plane(), 150.0);
        group.insert_level(primitives::plane(), 50.0);
        assert_eq!(group.distances(), vec![0.0, 50.0, 150.0]);

        group.insert_level(primitives::cube(), 50.0);
        assert_eq!(group.levels().len(), 3);
    }

    #[test]
    fn stats_count_level_zero_only() {
        let mut scene = Scene::new();
        let mut group = LodGroup::new(primitives::cube());
        group.insert_level(primitives::plane(), 50.0);
        scene.insert(SceneObject::new("lod", ObjectKind::Lod(group)));
        scene.insert(mesh("Box"));

        let stats = scene.stats();
        assert_eq!(stats.objects, 2);
        assert_eq!(stats.vertices, 48);
        assert_eq!(stats.triangles, 24);
        assert_eq!(stats.lod_groups, 1);
    }

    #[test]
    fn group_counts_before_decimated_levels_arrive() {
        let mut scene = Scene::new();
        scene.insert(SceneObject::new(
            "fresh",
            ObjectKind::Lod(LodGroup::new(primitives::cube())),
        ));

        let stats = scene.stats();
        assert_eq!(stats.lod_groups, 1);
        assert_eq!(stats.vertices, 24);
    }

    #[test]
    fn transform_matrix_scales_then_translates() {
        let t = Transform {
            position: Vector3::new(1.0, 0.0, 0.0),
            rotation: Vector3::zeros(),
            scale: Vector3::repeat(2.0),
        };
        let p = t.matrix().transform_point(&nalgebra::Point3::new(1.0, 1.0, 1.0));
        assert_eq!(p, nalgebra::Point3::new(3.0, 2.0, 2.0));
    }
}
