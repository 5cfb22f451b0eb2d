//! End-to-end integration tests driving two hosts over the loopback
//! transport: RPC across processes, timeout/stale-result idempotency, local
//! in-process routing, and property replication into a remote shadow.

use crate::args::ArgValue;
use crate::entity::Entity;
use crate::messages::{EntityRpcResult, WireMessage};
use crate::registry::EntityRegistry;
use crate::rpc::RpcError;
use crate::sync::property::ReplicationPolicy;
use crate::sync::record::PropertyKind;
use crate::transport::loopback::{LoopbackNetwork, LoopbackTransport};
use crate::transport::Transport;
use crate::types::{EntityId, Mailbox};
use crate::{args, scheduler::SchedulerError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Node {
    registry: Arc<EntityRegistry>,
    transport: Arc<LoopbackTransport>,
}

/// Routes traced events through the test harness; honors `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn spawn_node(network: &Arc<LoopbackNetwork>, host: &str, port: u16) -> Node {
    init_tracing();
    let registry = EntityRegistry::with_defaults();
    let transport = network.attach(host, port, registry.dispatcher());
    registry
        .bind_transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .await;
    Node {
        registry,
        transport,
    }
}

fn register_echo(entity: &Arc<Entity>) {
    entity.methods().register("Echo", |args| async move {
        let text: String = args
            .into_iter()
            .next()
            .ok_or_else(|| RpcError::Execution("missing argument".to_string()))?
            .decode()
            .map_err(RpcError::BadArgument)?;
        Ok(ArgValue::Str(format!("echo:{text}")))
    });
}

#[tokio::test(start_paused = true)]
async fn call_resolves_across_two_hosts() {
    let network = LoopbackNetwork::new();
    let node_a = spawn_node(&network, "proc-a", 7101).await;
    let node_b = spawn_node(&network, "proc-b", 7102).await;

    let mailbox_b = Mailbox::new("proc-b", 7102, 0, EntityId::new("B"));
    let entity_b = Entity::new(mailbox_b.clone());
    register_echo(&entity_b);
    node_b.registry.register_local_entity(entity_b).await;

    let entity_a = Entity::new(Mailbox::new("proc-a", 7101, 0, EntityId::new("A")));
    node_a
        .registry
        .register_local_entity(Arc::clone(&entity_a))
        .await;

    let reply: String = entity_a
        .call_as(mailbox_b, "Echo", args!["hi"])
        .await
        .unwrap();
    assert_eq!(reply, "echo:hi");
    assert_eq!(entity_a.pending_call_count(), 0);
    assert_eq!(entity_a.gateway_stats().snapshot().calls_resolved, 1);
}

#[tokio::test(start_paused = true)]
async fn unanswered_call_times_out_and_late_result_is_dropped() {
    let network = LoopbackNetwork::new();
    let node_a = spawn_node(&network, "proc-a", 7103).await;
    let node_b = spawn_node(&network, "proc-b", 7104).await;

    // The target exists but has no such method, so no reply is ever sent.
    let mailbox_b = Mailbox::new("proc-b", 7104, 0, EntityId::new("B"));
    node_b
        .registry
        .register_local_entity(Entity::new(mailbox_b.clone()))
        .await;

    let mailbox_a = Mailbox::new("proc-a", 7103, 0, EntityId::new("A"));
    let entity_a = Entity::new(mailbox_a.clone());
    node_a
        .registry
        .register_local_entity(Arc::clone(&entity_a))
        .await;

    let err = entity_a
        .call_with_timeout(
            mailbox_b,
            "Missing",
            args![],
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout { call_id: 1, .. }));
    assert_eq!(entity_a.pending_call_count(), 0);

    // A reply limping in after the timeout resolves nothing and breaks nothing.
    node_a
        .registry
        .dispatcher()
        .dispatch(WireMessage::RpcResult(EntityRpcResult {
            call_id: 1,
            target: mailbox_a,
            payload: ArgValue::Str("late".to_string()),
        }))
        .await;

    let stats = entity_a.gateway_stats().snapshot();
    assert_eq!(stats.calls_timed_out, 1);
    assert_eq!(stats.stale_results_dropped, 1);
    assert_eq!(stats.calls_resolved, 0);
}

#[tokio::test(start_paused = true)]
async fn local_calls_never_touch_the_transport() {
    let network = LoopbackNetwork::new();
    let node = spawn_node(&network, "proc-a", 7105).await;

    let mailbox_b = Mailbox::new("proc-a", 7105, 0, EntityId::new("B"));
    let entity_b = Entity::new(mailbox_b.clone());
    register_echo(&entity_b);
    node.registry.register_local_entity(entity_b).await;

    let entity_a = Entity::new(Mailbox::new("proc-a", 7105, 0, EntityId::new("A")));
    node.registry
        .register_local_entity(Arc::clone(&entity_a))
        .await;

    let reply: String = entity_a
        .call_as(mailbox_b.clone(), "Echo", args!["local"])
        .await
        .unwrap();
    assert_eq!(reply, "echo:local");

    entity_a
        .notify(mailbox_b.clone(), "Echo", args!["fire"])
        .await
        .unwrap();
    entity_a.send(mailbox_b, "Echo", args!["forget"]).await.unwrap();

    assert_eq!(node.transport.frames_sent(), 0);
}

#[tokio::test(start_paused = true)]
async fn notify_creates_no_pending_record() {
    let network = LoopbackNetwork::new();
    let node_a = spawn_node(&network, "proc-a", 7106).await;
    let node_b = spawn_node(&network, "proc-b", 7107).await;

    let observed = Arc::new(AtomicBool::new(false));
    let mailbox_b = Mailbox::new("proc-b", 7107, 0, EntityId::new("B"));
    let entity_b = Entity::new(mailbox_b.clone());
    {
        let observed = Arc::clone(&observed);
        entity_b.methods().register("Ping", move |_| {
            let observed = Arc::clone(&observed);
            async move {
                observed.store(true, Ordering::Release);
                Ok(ArgValue::Bool(true))
            }
        });
    }
    node_b.registry.register_local_entity(entity_b).await;

    let entity_a = Entity::new(Mailbox::new("proc-a", 7106, 0, EntityId::new("A")));
    node_a
        .registry
        .register_local_entity(Arc::clone(&entity_a))
        .await;

    assert_eq!(entity_a.pending_call_count(), 0);
    entity_a.notify(mailbox_b, "Ping", args![]).await.unwrap();
    assert_eq!(entity_a.pending_call_count(), 0);

    for _ in 0..100 {
        if observed.load(Ordering::Acquire) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(observed.load(Ordering::Acquire));
    assert_eq!(entity_a.pending_call_count(), 0);
    assert_eq!(entity_a.gateway_stats().snapshot().notifies_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn list_property_replicates_to_remote_shadow() {
    let network = LoopbackNetwork::new();
    let node_a = spawn_node(&network, "proc-a", 7108).await;
    let node_b = spawn_node(&network, "proc-b", 7109).await;

    let owner = Entity::new(Mailbox::new("proc-a", 7108, 0, EntityId::new("A")));
    owner
        .declare_property(
            "inventory",
            PropertyKind::List,
            ReplicationPolicy::SHADOWED,
            ArgValue::empty_list(),
        )
        .await
        .unwrap();
    let shadow_mailbox = Mailbox::new("proc-b", 7109, 0, EntityId::new("A"));
    owner.subscribe_shadow(shadow_mailbox.clone()).await;
    node_a
        .registry
        .register_local_entity(Arc::clone(&owner))
        .await;

    let shadow = Entity::shadow(shadow_mailbox);
    shadow
        .declare_property(
            "inventory",
            PropertyKind::List,
            ReplicationPolicy::SHADOWED,
            ArgValue::empty_list(),
        )
        .await
        .unwrap();
    node_b
        .registry
        .register_local_entity(Arc::clone(&shadow))
        .await;

    let (_pumps, _errors) = node_a.registry.spawn_pumps().await.unwrap();

    // Three mutations inside one tick coalesce into one two-record batch.
    let props = owner.properties();
    props
        .list_add("inventory", ArgValue::Str("x".to_string()))
        .await
        .unwrap();
    props
        .list_add("inventory", ArgValue::Str("y".to_string()))
        .await
        .unwrap();
    props.list_remove("inventory", 0).await.unwrap();

    let expected = ArgValue::List(vec![ArgValue::Str("y".to_string())]);
    let mut converged = false;
    for _ in 0..200 {
        if shadow.properties().value("inventory").await.unwrap() == expected {
            converged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(converged, "shadow never converged on the owner state");
    assert_eq!(
        owner.properties().value("inventory").await.unwrap(),
        expected
    );

    node_a.registry.shutdown().initiate_shutdown();
}

#[tokio::test(start_paused = true)]
async fn dict_property_coalesces_before_reaching_the_shadow() {
    let network = LoopbackNetwork::new();
    let node_a = spawn_node(&network, "proc-a", 7110).await;
    let node_b = spawn_node(&network, "proc-b", 7111).await;

    let owner = Entity::new(Mailbox::new("proc-a", 7110, 0, EntityId::new("A")));
    owner
        .declare_property(
            "attrs",
            PropertyKind::Dict,
            ReplicationPolicy::SHADOWED,
            ArgValue::empty_dict(),
        )
        .await
        .unwrap();
    let shadow_mailbox = Mailbox::new("proc-b", 7111, 0, EntityId::new("A"));
    owner.subscribe_shadow(shadow_mailbox.clone()).await;
    node_a
        .registry
        .register_local_entity(Arc::clone(&owner))
        .await;

    let shadow = Entity::shadow(shadow_mailbox);
    shadow
        .declare_property(
            "attrs",
            PropertyKind::Dict,
            ReplicationPolicy::SHADOWED,
            ArgValue::empty_dict(),
        )
        .await
        .unwrap();
    node_b
        .registry
        .register_local_entity(Arc::clone(&shadow))
        .await;

    let (_pumps, _errors) = node_a.registry.spawn_pumps().await.unwrap();

    let props = owner.properties();
    props
        .dict_update("attrs", "hp", ArgValue::Int(10))
        .await
        .unwrap();
    props
        .dict_update("attrs", "hp", ArgValue::Int(25))
        .await
        .unwrap();
    props
        .dict_update("attrs", "mp", ArgValue::Int(5))
        .await
        .unwrap();
    props.dict_remove("attrs", "mp").await.unwrap();

    let expected = ArgValue::Dict(BTreeMap::from([("hp".to_string(), ArgValue::Int(25))]));
    let mut converged = false;
    for _ in 0..200 {
        if shadow.properties().value("attrs").await.unwrap() == expected {
            converged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(converged, "shadow never converged on the owner state");

    node_a.registry.shutdown().initiate_shutdown();
}

#[tokio::test(start_paused = true)]
async fn unroutable_target_fails_the_call_immediately() {
    let network = LoopbackNetwork::new();
    let node = spawn_node(&network, "proc-a", 7112).await;

    let entity = Entity::new(Mailbox::new("proc-a", 7112, 0, EntityId::new("A")));
    node.registry
        .register_local_entity(Arc::clone(&entity))
        .await;

    let nowhere = Mailbox::new("proc-x", 9999, 0, EntityId::new("ghost"));
    let err = entity.call(nowhere, "Echo", args!["hi"]).await.unwrap_err();
    assert!(matches!(err, RpcError::Routing(_)));
    // The record was torn down with the failed send, not left to time out.
    assert_eq!(entity.pending_call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn flush_failures_reach_the_error_channel_without_stalling_ticks() {
    let network = LoopbackNetwork::new();
    let node = spawn_node(&network, "proc-a", 7113).await;

    let owner = Entity::new(Mailbox::new("proc-a", 7113, 0, EntityId::new("A")));
    owner
        .declare_property(
            "score",
            PropertyKind::Plain,
            ReplicationPolicy::SHADOWED,
            ArgValue::Int(0),
        )
        .await
        .unwrap();
    // Subscriber on an endpoint that was never attached.
    owner
        .subscribe_shadow(Mailbox::new("proc-x", 9999, 0, EntityId::new("A")))
        .await;
    node.registry
        .register_local_entity(Arc::clone(&owner))
        .await;

    let (_pumps, mut errors) = node.registry.spawn_pumps().await.unwrap();

    owner
        .properties()
        .set("score", ArgValue::Int(1))
        .await
        .unwrap();
    let error = errors.recv().await.expect("error channel closed");
    assert!(matches!(error, SchedulerError::Flush { .. }));

    // Later batches still flow: the failed entry was cancelled, not the pump.
    owner
        .properties()
        .set("score", ArgValue::Int(2))
        .await
        .unwrap();
    let error = errors.recv().await.expect("error channel closed");
    assert!(matches!(error, SchedulerError::Flush { .. }));

    node.registry.shutdown().initiate_shutdown();
}
