//! CSG boolean coordinator
//!
//! A boolean runs in three steps:
//! 1. [`plan`] resolves both operands to their renderable mesh (level 0 for
//!    a LOD group) and bakes their world transforms into [`Brush`]es
//! 2. the runtime defers the plan by one tick through its event queue
//! 3. [`evaluate`] re-checks that both operands are still live and
//!    unchanged, then runs the [`BooleanEvaluator`]
//!
//! Nothing in the scene is touched until evaluation has succeeded; the
//! runtime then disposes both operands and inserts the result.

use crate::error::{CsgError, SandboxError};
use crate::scene::{Material, Scene, SceneObject};
use nalgebra::Point3;
use scenelink_geometry::{compute_vertex_normals, Geometry};
use scenelink_protocol::{BooleanOp, ObjectId};

/// Closed mesh in world space fed to the CSG kernel
#[derive(Debug, Clone, PartialEq)]
pub struct Brush {
    pub geometry: Geometry,
}

/// CSG math kernel: two oriented brushes in, one brush out
#[cfg_attr(test, mockall::automock)]
pub trait BooleanEvaluator: Send + Sync {
    fn evaluate(&self, op: BooleanOp, target: &Brush, tool: &Brush) -> Result<Brush, CsgError>;
}

/// Operand captured when the boolean was requested
#[derive(Debug, Clone)]
pub struct Operand {
    pub id: ObjectId,
    pub revision: u64,
    pub brush: Brush,
}

/// Everything needed to finish a boolean after the deferral
#[derive(Debug, Clone)]
pub struct CsgPlan {
    pub op: BooleanOp,
    pub target: Operand,
    pub tool: Operand,
    /// Name for the result, derived from the target
    pub result_name: String,
    /// Inherited from the target
    pub material: Material,
}

/// Resolve both operands and capture their world-space brushes
pub fn plan(
    scene: &Scene,
    op: BooleanOp,
    target_id: ObjectId,
    tool_id: ObjectId,
) -> Result<CsgPlan, SandboxError> {
    if target_id == tool_id {
        return Err(SandboxError::SameOperand);
    }
    let target = scene.require(target_id)?;
    let tool = scene.require(tool_id)?;

    Ok(CsgPlan {
        op,
        target: operand(target)?,
        tool: operand(tool)?,
        result_name: format!("{}_{}", target.name, op),
        material: target.material,
    })
}

fn operand(object: &SceneObject) -> Result<Operand, SandboxError> {
    let geometry = object
        .world_geometry()
        .ok_or(SandboxError::NotAMesh(object.id))?;
    Ok(Operand {
        id: object.id,
        revision: object.revision,
        brush: Brush { geometry },
    })
}

/// Re-validate the operands and run the kernel
///
/// Does not mutate the scene.
pub fn evaluate(
    scene: &Scene,
    plan: &CsgPlan,
    evaluator: &dyn BooleanEvaluator,
) -> Result<Brush, SandboxError> {
    for operand in [&plan.target, &plan.tool] {
        match scene.revision(operand.id) {
            Some(rev) if rev == operand.revision => {}
            Some(_) => return Err(SandboxError::Stale(operand.id)),
            None => return Err(SandboxError::ObjectNotFound(operand.id)),
        }
    }
    let result = evaluator.evaluate(plan.op, &plan.target.brush, &plan.tool.brush)?;
    if result.geometry.triangle_count() == 0 {
        return Err(CsgError::EmptyResult(plan.op.as_str()).into());
    }
    Ok(result)
}

/// [`BooleanEvaluator`] backed by the `csgrs` BSP kernel
#[derive(Debug, Clone, Copy, Default)]
pub struct CsgrsEvaluator;

impl BooleanEvaluator for CsgrsEvaluator {
    fn evaluate(&self, op: BooleanOp, target: &Brush, tool: &Brush) -> Result<Brush, CsgError> {
        use csgrs::traits::CSG;

        if target.geometry.triangle_count() == 0 {
            return Err(CsgError::EmptyOperand("target"));
        }
        if tool.geometry.triangle_count() == 0 {
            return Err(CsgError::EmptyOperand("tool"));
        }

        let a = to_csgrs(&target.geometry);
        let b = to_csgrs(&tool.geometry);
        let out = match op {
            BooleanOp::Union => a.union(&b),
            BooleanOp::Subtract => a.difference(&b),
            BooleanOp::Intersect => a.intersection(&b),
        };

        let geometry = from_csgrs(&out);
        tracing::debug!(
            %op,
            triangles_in = target.geometry.triangle_count() + tool.geometry.triangle_count(),
            triangles_out = geometry.triangle_count(),
            "csg evaluated"
        );
        Ok(Brush { geometry })
    }
}

fn to_csgrs(geometry: &Geometry) -> csgrs::mesh::Mesh<()> {
    use csgrs::mesh::{polygon::Polygon, vertex::Vertex, Mesh as CsgMesh};

    let point = |i: usize| {
        let p = geometry.position(i);
        Point3::new(f64::from(p.x), f64::from(p.y), f64::from(p.z))
    };

    let polygons: Vec<Polygon<()>> = geometry
        .triangles()
        .filter_map(|[i0, i1, i2]| {
            let (v0, v1, v2) = (point(i0), point(i1), point(i2));
            // Degenerate triangles would poison the BSP planes with NaN
            let normal = (v1 - v0).cross(&(v2 - v0)).try_normalize(1e-10)?;
            Some(Polygon::new(
                vec![
                    Vertex::new(v0, normal),
                    Vertex::new(v1, normal),
                    Vertex::new(v2, normal),
                ],
                None,
            ))
        })
        .collect();

    CsgMesh::from_polygons(&polygons, None)
}

fn from_csgrs(mesh: &csgrs::mesh::Mesh<()>) -> Geometry {
    let mut positions = Vec::new();
    let mut indices = Vec::new();

    for polygon in &mesh.polygons {
        let vertices = &polygon.vertices;
        if vertices.len() < 3 {
            continue;
        }
        let base = (positions.len() / 3) as u32;
        for v in vertices {
            #[allow(clippy::cast_possible_truncation)]
            positions.extend_from_slice(&[v.pos[0] as f32, v.pos[1] as f32, v.pos[2] as f32]);
        }
        // BSP output polygons are convex, so a fan is enough
        for k in 1..vertices.len() as u32 - 1 {
            indices.extend_from_slice(&[base, base + k, base + k + 1]);
        }
    }

    let mut geometry = Geometry::new(positions, Some(indices));
    compute_vertex_normals(&mut geometry);
    geometry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ObjectKind, Transform};
    use scenelink_geometry::primitives;

    fn cube_at(scene: &mut Scene, name: &str, x: f32) -> ObjectId {
        scene.insert(
            SceneObject::new(name, ObjectKind::Mesh(primitives::cube()))
                .with_transform(Transform::at([x, 0.0, 0.0]))
                .with_material(Material::colored(0xff_00_00)),
        )
    }

    #[test]
    fn plan_bakes_world_transform() {
        let mut scene = Scene::new();
        let a = cube_at(&mut scene, "A", 0.0);
        let b = cube_at(&mut scene, "B", 10.0);

        let plan = plan(&scene, BooleanOp::Union, a, b).unwrap();
        let (min, _) = plan.tool.brush.geometry.bounds().unwrap();
        assert!((min.x - 9.5).abs() < 1e-5);
        assert_eq!(plan.result_name, "A_union");
        assert_eq!(plan.material.color, 0xff_00_00);
    }

    #[test]
    fn plan_rejects_same_operand() {
        let mut scene = Scene::new();
        let a = cube_at(&mut scene, "A", 0.0);
        assert_eq!(
            plan(&scene, BooleanOp::Subtract, a, a).unwrap_err(),
            SandboxError::SameOperand
        );
    }

    #[test]
    fn evaluate_detects_removed_operand() {
        let mut scene = Scene::new();
        let a = cube_at(&mut scene, "A", 0.0);
        let b = cube_at(&mut scene, "B", 0.5);
        let plan = plan(&scene, BooleanOp::Union, a, b).unwrap();
        scene.remove(b);

        let mut kernel = MockBooleanEvaluator::new();
        kernel.expect_evaluate().never();
        assert_eq!(
            evaluate(&scene, &plan, &kernel).unwrap_err(),
            SandboxError::ObjectNotFound(b)
        );
    }

    #[test]
    fn evaluate_detects_replaced_geometry() {
        let mut scene = Scene::new();
        let a = cube_at(&mut scene, "A", 0.0);
        let b = cube_at(&mut scene, "B", 0.5);
        let plan = plan(&scene, BooleanOp::Intersect, a, b).unwrap();
        scene.get_mut(a).unwrap().revision += 1;

        let mut kernel = MockBooleanEvaluator::new();
        kernel.expect_evaluate().never();
        assert_eq!(
            evaluate(&scene, &plan, &kernel).unwrap_err(),
            SandboxError::Stale(a)
        );
    }

    #[test]
    fn kernel_failure_surfaces() {
        let mut scene = Scene::new();
        let a = cube_at(&mut scene, "A", 0.0);
        let b = cube_at(&mut scene, "B", 0.5);
        let plan = plan(&scene, BooleanOp::Union, a, b).unwrap();

        let mut kernel = MockBooleanEvaluator::new();
        kernel
            .expect_evaluate()
            .times(1)
            .returning(|_, _, _| Err(CsgError::Kernel("non-manifold".into())));
        let err = evaluate(&scene, &plan, &kernel).unwrap_err();
        assert_eq!(err.to_string(), "csg kernel error: non-manifold");
    }

    #[test]
    fn csgrs_union_of_overlapping_cubes() {
        let mut scene = Scene::new();
        let a = cube_at(&mut scene, "A", 0.0);
        let b = cube_at(&mut scene, "B", 0.5);
        let plan = plan(&scene, BooleanOp::Union, a, b).unwrap();

        let result = evaluate(&scene, &plan, &CsgrsEvaluator).unwrap();
        let (min, max) = result.geometry.bounds().unwrap();
        assert!((min.x + 0.5).abs() < 1e-4);
        assert!((max.x - 1.0).abs() < 1e-4);
        assert!(result.geometry.validate().is_ok());
    }

    #[test]
    fn csgrs_intersect_of_disjoint_cubes_is_empty() {
        let mut scene = Scene::new();
        let a = cube_at(&mut scene, "A", 0.0);
        let b = cube_at(&mut scene, "B", 5.0);
        let plan = plan(&scene, BooleanOp::Intersect, a, b).unwrap();

        let err = evaluate(&scene, &plan, &CsgrsEvaluator).unwrap_err();
        assert!(matches!(err, SandboxError::Csg(CsgError::EmptyResult("intersect"))));
    }
}
