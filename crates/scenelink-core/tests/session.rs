//! End-to-end session tests: host gateway, sandbox runtime and worker thread

use pretty_assertions::assert_eq;
use scenelink_core::{
    BridgeConfig, GeneratorError, SceneGenerator, Script, Session, SessionError,
};
use scenelink_gateway::GatewayError;
use scenelink_protocol::{
    AdvisoryCommand, BooleanOp, ExportFormat, ObjectId, PrimitiveKind, SandboxCommand,
    SandboxMessage, SceneNode, SceneNodeKind,
};
use scenelink_test_utils::{FailingEvaluator, StubEvaluator};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn config() -> BridgeConfig {
    BridgeConfig::new()
        .with_timeout_ms(10_000)
        .with_broadcast_debounce_ms(10)
}

fn connect(config: &BridgeConfig) -> Session {
    Session::connect(config, Arc::new(StubEvaluator::default())).unwrap()
}

async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out waiting on the session")
}

async fn add(session: &Session, kind: PrimitiveKind, name: &str) -> ObjectId {
    let result = session
        .send(SandboxCommand::AddPrimitive {
            prim_type: kind,
            name: Some(name.into()),
            position: None,
            detail: Some(8),
            color: None,
        })
        .await
        .unwrap();
    result.object_id().unwrap()
}

fn names(nodes: &[SceneNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.name.as_str()).collect()
}

struct FixedGenerator(&'static str);

#[async_trait::async_trait]
impl SceneGenerator for FixedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        if prompt.is_empty() {
            return Err(GeneratorError::Empty);
        }
        Ok(self.0.to_owned())
    }
}

#[tokio::test]
async fn boolean_union_replaces_operands_in_mirror() {
    let session = connect(&config());
    let mut mirror = session.mirror();

    let a = add(&session, PrimitiveKind::Box, "A").await;
    let b = add(&session, PrimitiveKind::Sphere, "B").await;
    within(mirror.wait_until(|nodes| nodes.len() == 2)).await.unwrap();

    let result = session
        .send(SandboxCommand::PerformBoolean {
            op: BooleanOp::Union,
            target_id: a,
            tool_id: b,
        })
        .await
        .unwrap();
    let union_id = result.object_id().unwrap();

    let nodes = within(mirror.wait_until(|nodes| nodes.iter().any(|n| n.name == "A_union")))
        .await
        .unwrap();
    assert_eq!(names(&nodes), vec!["A_union"]);
    assert_eq!(nodes[0].id, union_id);
    assert!(nodes[0].selected);
    assert!(mirror.get(a).is_none());
    assert!(mirror.get(b).is_none());

    session.teardown().await;
}

#[tokio::test]
async fn failed_boolean_keeps_both_operands() {
    let session =
        Session::connect(&config(), Arc::new(FailingEvaluator::default())).unwrap();
    let a = add(&session, PrimitiveKind::Box, "A").await;
    let b = add(&session, PrimitiveKind::Cylinder, "B").await;

    let err = session
        .send(SandboxCommand::PerformBoolean {
            op: BooleanOp::Subtract,
            target_id: a,
            tool_id: b,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Gateway(GatewayError::Failed { ref message, .. }) if message.contains("kernel exploded")
    ));

    let mut events = session.subscribe();
    session.send(SandboxCommand::GetGeometryStats).await.unwrap();
    let stats = within(async {
        loop {
            if let SandboxMessage::GeometryStats { stats } = events.recv().await.unwrap() {
                return stats;
            }
        }
    })
    .await;
    assert_eq!(stats.objects, 2);

    session.teardown().await;
}

#[tokio::test]
async fn decimate_large_mesh_reports_reduced_count() {
    let session = connect(&config().with_vertex_threshold(1_000_000));
    let result = session
        .send(SandboxCommand::AddPrimitive {
            prim_type: PrimitiveKind::Sphere,
            name: None,
            position: None,
            // 141 x 71 vertices
            detail: Some(140),
            color: None,
        })
        .await
        .unwrap();
    let id = result.object_id().unwrap();

    let decimated = session
        .send(SandboxCommand::Decimate {
            object_id: id,
            percent: 0.5,
        })
        .await
        .unwrap();
    let vertices = decimated.data.as_ref().unwrap()["vertices"].as_u64().unwrap();
    assert!(vertices > 0);
    assert!(vertices <= 10_011);

    session.teardown().await;
}

#[tokio::test]
async fn large_mesh_shows_up_as_lod_group() {
    let session = connect(&config().with_vertex_threshold(1000));
    let mut mirror = session.mirror();

    let result = session
        .send(SandboxCommand::AddPrimitive {
            prim_type: PrimitiveKind::Sphere,
            name: Some("Ball".into()),
            position: None,
            detail: Some(64),
            color: None,
        })
        .await
        .unwrap();
    let id = result.object_id().unwrap();

    let nodes = within(mirror.wait_until(|nodes| !nodes.is_empty())).await.unwrap();
    assert_eq!(nodes[0].id, id);
    assert_eq!(nodes[0].kind, SceneNodeKind::Lod);

    session.teardown().await;
}

#[tokio::test]
async fn advisory_commands_are_not_tracked() {
    let session = connect(&config());
    for _ in 0..2 {
        session
            .send_fire_and_forget(AdvisoryCommand::ToggleGrid { visible: false })
            .await
            .unwrap();
    }
    assert_eq!(session.gateway().pending_count(), 0);

    // Inbound order is preserved, so a tracked command after them still acks
    session.send(SandboxCommand::GetGeometryStats).await.unwrap();
    session.teardown().await;
}

#[tokio::test]
async fn pick_and_select_share_the_selection() {
    let session = connect(&config());
    let mut mirror = session.mirror();
    let a = add(&session, PrimitiveKind::Box, "A").await;
    let b = add(&session, PrimitiveKind::Plane, "B").await;

    session.pick(Some(b)).await.unwrap();
    within(mirror.wait_until(|nodes| nodes.iter().any(|n| n.id == b && n.selected)))
        .await
        .unwrap();

    session
        .send(SandboxCommand::SelectObject { object_id: Some(a) })
        .await
        .unwrap();
    let nodes = within(mirror.wait_until(|nodes| nodes.iter().any(|n| n.id == a && n.selected)))
        .await
        .unwrap();
    assert_eq!(nodes.iter().filter(|n| n.selected).count(), 1);

    session.teardown().await;
}

#[tokio::test]
async fn generated_scene_replaces_contents() {
    let markup = r#"{"objects":[
        {"name":"Table top","primitive":"box","position":[0,1,0],"scale":[2,0.1,1]},
        {"name":"Leg","primitive":"cylinder","scale":[0.1,1,0.1]}
    ]}"#;
    let session = connect(&config()).with_generator(Arc::new(FixedGenerator(markup)));
    let mut mirror = session.mirror();
    add(&session, PrimitiveKind::Torus, "old").await;

    let result = session.generate_scene("a small table").await.unwrap();
    assert_eq!(
        result.data.as_ref().unwrap()["objectIds"].as_array().unwrap().len(),
        2
    );

    let nodes = within(mirror.wait_until(|nodes| nodes.iter().any(|n| n.name == "Leg")))
        .await
        .unwrap();
    assert_eq!(names(&nodes), vec!["Table top", "Leg"]);

    session.teardown().await;
}

#[tokio::test]
async fn generation_errors_surface() {
    let session = connect(&config());
    assert!(matches!(
        session.generate_scene("anything").await,
        Err(SessionError::NoGenerator)
    ));

    let session = session.with_generator(Arc::new(FixedGenerator("not a scene")));
    assert!(matches!(
        session.generate_scene("").await,
        Err(SessionError::Generator(GeneratorError::Empty))
    ));
    let err = session.generate_scene("a chair").await.unwrap_err();
    assert!(err.to_string().contains("invalid scene markup"), "{err}");

    session.teardown().await;
}

#[tokio::test]
async fn script_runs_with_step_references() {
    let script = Script::parse(
        r#"[
            {"type":"addPrimitive","primType":"box","name":"A"},
            {"type":"addPrimitive","primType":"sphere","name":"B","detail":8},
            {"type":"performBoolean","op":"union","targetId":"@0","toolId":"@1"},
            {"type":"toggleGrid","visible":false},
            {"type":"removeObject","objectId":"@3"},
            {"type":"exportScene","format":"obj"}
        ]"#,
    )
    .unwrap();
    let session = connect(&config());

    let reports = script.run(&session).await.unwrap();
    assert_eq!(reports.len(), 6);
    assert!(reports[..4].iter().all(|r| r.success));
    assert!(reports[2].object_id.is_some());
    // Advisory step returns no id to reference
    assert!(!reports[4].success);
    assert!(reports[4].error.as_deref().unwrap().contains("@3"));
    assert!(reports[5].success);
    assert_eq!(reports[5].command_type, "exportScene");

    session.teardown().await;
}

#[tokio::test]
async fn export_pushes_bytes_before_ack() {
    let session = connect(&config());
    add(&session, PrimitiveKind::Box, "A").await;
    let mut events = session.subscribe();

    let result = session
        .send(SandboxCommand::ExportScene {
            format: ExportFormat::Stl,
        })
        .await
        .unwrap();

    // Scene-graph broadcasts from the add may interleave
    let (file_name, data) = within(async {
        loop {
            if let SandboxMessage::ExportComplete {
                file_name, data, ..
            } = events.recv().await.unwrap()
            {
                return (file_name, data);
            }
        }
    })
    .await;
    assert_eq!(file_name, "scene.stl");
    assert_eq!(data.len(), 84 + 12 * 50);
    assert_eq!(
        result.data.as_ref().unwrap()["byteLength"].as_u64(),
        Some(data.len() as u64)
    );

    session.teardown().await;
}

#[tokio::test]
async fn sessions_share_nothing() {
    let first = connect(&config());
    let second = connect(&config());
    let mut first_mirror = first.mirror();

    add(&first, PrimitiveKind::Box, "only in first").await;
    within(first_mirror.wait_until(|nodes| nodes.len() == 1)).await.unwrap();
    assert!(second.mirror().is_empty());

    first.teardown().await;
    second.send(SandboxCommand::GetGeometryStats).await.unwrap();
    second.teardown().await;
}

#[tokio::test]
async fn teardown_rejects_later_sends() {
    let session = connect(&config());
    let gateway = session.gateway().clone();
    session.teardown().await;

    assert!(gateway.is_destroyed());
    let err = gateway
        .send_default(SandboxCommand::ClearScene)
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::Destroyed);
}
