//! Gateway behavior against a scripted sandbox

use pretty_assertions::assert_eq;
use scenelink_gateway::{ChannelPort, CommandGateway, GatewayConfig, GatewayError, SandboxPort};
use scenelink_protocol::{
    CommandId, Envelope, ObjectId, PrimitiveKind, SandboxCommand, SandboxMessage, SceneNode,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

fn gateway(config: GatewayConfig) -> (CommandGateway, UnboundedReceiver<String>) {
    let (port, rx) = ChannelPort::pair();
    (CommandGateway::new(Arc::new(port), config), rx)
}

/// Port whose queue never drains
struct StalledPort;

#[async_trait::async_trait]
impl SandboxPort for StalledPort {
    async fn post(&self, _text: String) -> Result<(), GatewayError> {
        std::future::pending().await
    }
}

fn stalled_gateway(config: GatewayConfig) -> CommandGateway {
    CommandGateway::new(Arc::new(StalledPort), config)
}

fn drain_ids(rx: &mut UnboundedReceiver<String>) -> Vec<CommandId> {
    let mut ids = Vec::new();
    while let Ok(text) = rx.try_recv() {
        let envelope = Envelope::decode(&text).unwrap();
        ids.push(envelope.command_id.unwrap());
    }
    ids
}

fn ack(id: CommandId, success: bool) -> String {
    let message = if success {
        SandboxMessage::ack_ok(id, Some(serde_json::json!({ "objectId": ObjectId::new() })))
    } else {
        SandboxMessage::ack_err(id, "sandbox busy")
    };
    message.encode().unwrap()
}

#[tokio::test(start_paused = true)]
async fn silent_sandbox_gets_one_window_per_attempt() {
    let (gateway, mut rx) = gateway(GatewayConfig {
        timeout: Duration::from_millis(1000),
        retries: 2,
        retry_delay: Duration::from_millis(500),
    });

    let started = Instant::now();
    let err = gateway
        .send_default(SandboxCommand::GetGeometryStats)
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), Duration::from_millis(4000));
    assert!(matches!(err, GatewayError::Timeout { timeout_ms: 1000, .. }));

    let ids = drain_ids(&mut rx);
    assert_eq!(ids.len(), 3);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 3);
    assert_eq!(gateway.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_names_the_command() {
    let (gateway, _rx) = gateway(GatewayConfig::default());
    let options = gateway
        .default_options()
        .with_timeout(Duration::from_millis(5000))
        .with_retries(0);

    let started = Instant::now();
    let err = gateway
        .send(SandboxCommand::add_primitive(PrimitiveKind::Box), options)
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), Duration::from_millis(5000));
    assert_eq!(err.command_type(), Some("addPrimitive"));
    assert_eq!(err.to_string(), "addPrimitive timed out after 5000ms");
}

#[tokio::test]
async fn success_ack_resolves_with_payload() {
    let (gateway, mut rx) = gateway(GatewayConfig::default());
    let sandbox = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            let text = rx.recv().await.unwrap();
            let id = Envelope::decode(&text).unwrap().command_id.unwrap();
            assert!(gateway.handle_incoming(&ack(id, true)).is_none());
            id
        })
    };

    let result = gateway
        .send_default(SandboxCommand::add_primitive(PrimitiveKind::Sphere))
        .await
        .unwrap();
    let id = sandbox.await.unwrap();

    assert_eq!(result.command_id, id);
    assert_eq!(result.command_type, "addPrimitive");
    assert!(result.success);
    assert!(result.object_id().is_some());
    assert_eq!(gateway.pending_count(), 0);
}

#[tokio::test]
async fn unknown_ack_changes_nothing() {
    let (gateway, mut rx) = gateway(GatewayConfig::default());
    let in_flight = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.send_default(SandboxCommand::ClearScene).await })
    };
    let text = rx.recv().await.unwrap();
    let real = Envelope::decode(&text).unwrap().command_id.unwrap();
    assert_eq!(gateway.pending_count(), 1);

    assert!(gateway.handle_incoming(&ack(CommandId::new(), true)).is_none());
    assert_eq!(gateway.pending_count(), 1);
    assert!(!in_flight.is_finished());

    gateway.handle_incoming(&ack(real, true));
    assert!(in_flight.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn failure_ack_retries_under_new_id() {
    let (gateway, mut rx) = gateway(GatewayConfig {
        retries: 1,
        ..GatewayConfig::default()
    });
    let sandbox = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            let first = Envelope::decode(&rx.recv().await.unwrap()).unwrap();
            let first_id = first.command_id.unwrap();
            gateway.handle_incoming(&ack(first_id, false));

            let second = Envelope::decode(&rx.recv().await.unwrap()).unwrap();
            let second_id = second.command_id.unwrap();
            assert_eq!(second.command, first.command);

            // Late ack for the abandoned id is ignored
            gateway.handle_incoming(&ack(first_id, true));
            gateway.handle_incoming(&ack(second_id, true));
            (first_id, second_id)
        })
    };

    let result = gateway
        .send_default(SandboxCommand::add_primitive(PrimitiveKind::Torus))
        .await
        .unwrap();
    let (first_id, second_id) = sandbox.await.unwrap();

    assert_ne!(first_id, second_id);
    assert_eq!(result.command_id, second_id);
}

#[tokio::test]
async fn failure_ack_without_retries_surfaces_message() {
    let (gateway, mut rx) = gateway(GatewayConfig::default());
    let sandbox = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            let id = Envelope::decode(&rx.recv().await.unwrap())
                .unwrap()
                .command_id
                .unwrap();
            gateway.handle_incoming(&ack(id, false));
        })
    };

    let err = gateway
        .send_default(SandboxCommand::Repair {
            object_id: ObjectId::new(),
        })
        .await
        .unwrap_err();
    sandbox.await.unwrap();

    assert_eq!(
        err,
        GatewayError::Failed {
            command_type: "repair".into(),
            message: "sandbox busy".into(),
        }
    );
}

#[tokio::test]
async fn destroy_rejects_pending_and_future_sends() {
    let (gateway, mut rx) = gateway(GatewayConfig::default());
    let in_flight: Vec<_> = (0..3)
        .map(|_| {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.send_default(SandboxCommand::GetGeometryStats).await })
        })
        .collect();
    for _ in 0..3 {
        rx.recv().await.unwrap();
    }
    assert_eq!(gateway.pending_count(), 3);

    gateway.destroy();

    for handle in in_flight {
        assert_eq!(handle.await.unwrap().unwrap_err(), GatewayError::Destroyed);
    }
    assert_eq!(gateway.pending_count(), 0);
    assert!(gateway.is_destroyed());

    let err = gateway
        .send_default(SandboxCommand::ClearScene)
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::Destroyed);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn untracked_messages_reach_subscribers() {
    let (gateway, _rx) = gateway(GatewayConfig::default());
    let mut events = gateway.subscribe();

    let update = SandboxMessage::SceneGraphUpdate {
        nodes: Vec::<SceneNode>::new(),
    };
    let forwarded = gateway.handle_incoming(&update.encode().unwrap());

    assert_eq!(forwarded.as_ref(), Some(&update));
    assert_eq!(events.recv().await.unwrap(), update);
}

#[tokio::test(start_paused = true)]
async fn stalled_delivery_still_times_out() {
    let gateway = stalled_gateway(GatewayConfig::default());
    let options = gateway
        .default_options()
        .with_timeout(Duration::from_millis(5000))
        .with_retries(0);

    let started = Instant::now();
    let err = gateway
        .send(SandboxCommand::add_primitive(PrimitiveKind::Box), options)
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), Duration::from_millis(5000));
    assert_eq!(err.to_string(), "addPrimitive timed out after 5000ms");
    assert_eq!(gateway.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_delivery_gets_one_window_per_attempt() {
    let gateway = stalled_gateway(GatewayConfig {
        timeout: Duration::from_millis(1000),
        retries: 2,
        retry_delay: Duration::from_millis(500),
    });

    let started = Instant::now();
    let err = gateway
        .send_default(SandboxCommand::GetGeometryStats)
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), Duration::from_millis(4000));
    assert!(matches!(err, GatewayError::Timeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn destroy_rejects_send_stuck_in_delivery() {
    let gateway = stalled_gateway(GatewayConfig::default());
    let in_flight = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.send_default(SandboxCommand::ClearScene).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(gateway.pending_count(), 1);

    let started = Instant::now();
    gateway.destroy();
    let outcome = tokio::time::timeout(Duration::from_secs(1), in_flight)
        .await
        .expect("destroy left the send pending");

    assert_eq!(outcome.unwrap().unwrap_err(), GatewayError::Destroyed);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(gateway.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn destroy_cuts_the_retry_delay_short() {
    let (gateway, mut rx) = gateway(GatewayConfig {
        timeout: Duration::from_millis(100),
        retries: 3,
        retry_delay: Duration::from_secs(60),
    });
    let in_flight = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.send_default(SandboxCommand::GetGeometryStats).await })
    };
    rx.recv().await.unwrap();
    // First window expired, now sleeping before the retry
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(gateway.pending_count(), 0);

    let started = Instant::now();
    gateway.destroy();
    let err = in_flight.await.unwrap().unwrap_err();

    assert_eq!(err, GatewayError::Destroyed);
    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(rx.try_recv().is_err());
}
