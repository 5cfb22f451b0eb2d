//! Unit tests for the pending-call table and method dispatch.

use super::pending::PendingCallTable;
use super::{MethodTable, RpcError};
use crate::args::ArgValue;
use crate::stats::GatewayStats;
use crate::types::EntityId;
use std::sync::Arc;
use std::time::Duration;

fn table() -> (Arc<PendingCallTable>, Arc<GatewayStats>) {
    let stats = Arc::new(GatewayStats::default());
    let table = Arc::new(PendingCallTable::new(
        EntityId::new("caller"),
        Arc::clone(&stats),
    ));
    (table, stats)
}

// ============================================================================
// Pending-call table
// ============================================================================

#[tokio::test]
async fn resolve_before_timeout_completes_the_handle() {
    let (table, stats) = table();
    let receiver = table.register(1, Duration::from_secs(5));
    assert_eq!(table.len(), 1);

    assert!(table.resolve(1, ArgValue::Str("ok".to_string())));
    assert!(table.is_empty());

    let outcome = receiver.await.unwrap();
    assert_eq!(outcome.unwrap(), ArgValue::Str("ok".to_string()));
    assert_eq!(stats.snapshot().calls_resolved, 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_fires_exactly_once_and_late_result_is_a_noop() {
    let (table, stats) = table();
    let receiver = table.register(7, Duration::from_millis(1000));

    let outcome = receiver.await.unwrap();
    match outcome {
        Err(RpcError::Timeout {
            entity,
            call_id,
            timeout_ms,
        }) => {
            assert_eq!(entity, EntityId::new("caller"));
            assert_eq!(call_id, 7);
            assert_eq!(timeout_ms, 1000);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(table.is_empty());

    // A result arriving after the timeout finds no record and is dropped.
    assert!(!table.resolve(7, ArgValue::Int(1)));
    assert!(!table.resolve(7, ArgValue::Int(1)));

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.calls_timed_out, 1);
    assert_eq!(snapshot.stale_results_dropped, 2);
    assert_eq!(snapshot.calls_resolved, 0);
}

#[tokio::test]
async fn resolving_twice_only_succeeds_once() {
    let (table, _) = table();
    let _receiver = table.register(3, Duration::from_secs(5));
    assert!(table.resolve(3, ArgValue::Bool(true)));
    assert!(!table.resolve(3, ArgValue::Bool(true)));
}

#[tokio::test]
async fn discard_removes_without_resolving() {
    let (table, stats) = table();
    let receiver = table.register(4, Duration::from_secs(5));
    table.discard(4);
    assert!(table.is_empty());
    // The sender was dropped, not resolved.
    assert!(receiver.await.is_err());
    assert_eq!(stats.snapshot().calls_resolved, 0);
}

#[tokio::test]
async fn abandon_all_fails_outstanding_handles() {
    let (table, _) = table();
    let first = table.register(10, Duration::from_secs(5));
    let second = table.register(11, Duration::from_secs(5));

    table.abandon_all();
    assert!(table.is_empty());

    assert!(matches!(
        first.await.unwrap(),
        Err(RpcError::Abandoned { call_id: 10 })
    ));
    assert!(matches!(
        second.await.unwrap(),
        Err(RpcError::Abandoned { call_id: 11 })
    ));
}

// ============================================================================
// Method dispatch table
// ============================================================================

#[tokio::test]
async fn invoke_routes_to_the_registered_handler() {
    let methods = MethodTable::new();
    methods.register("Double", |args| async move {
        let n: i64 = args
            .into_iter()
            .next()
            .ok_or_else(|| RpcError::Execution("missing argument".to_string()))?
            .decode()
            .map_err(RpcError::BadArgument)?;
        Ok(ArgValue::Int(n * 2))
    });

    let result = methods
        .invoke("Double", vec![ArgValue::Int(21)])
        .await
        .unwrap();
    assert_eq!(result, ArgValue::Int(42));
}

#[tokio::test]
async fn invoke_unknown_method_fails() {
    let methods = MethodTable::new();
    let err = methods.invoke("Missing", Vec::new()).await.unwrap_err();
    assert!(matches!(err, RpcError::UnknownMethod(name) if name == "Missing"));
}

#[tokio::test]
async fn handler_argument_mismatch_surfaces_as_bad_argument() {
    let methods = MethodTable::new();
    methods.register("Upper", |args| async move {
        let text: String = args
            .into_iter()
            .next()
            .ok_or_else(|| RpcError::Execution("missing argument".to_string()))?
            .decode()
            .map_err(RpcError::BadArgument)?;
        Ok(ArgValue::Str(text.to_uppercase()))
    });

    let err = methods
        .invoke("Upper", vec![ArgValue::Int(3)])
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::BadArgument(_)));
}

#[tokio::test]
async fn registration_replaces_previous_handler() {
    let methods = MethodTable::new();
    methods.register("Version", |_| async move { Ok(ArgValue::Int(1)) });
    methods.register("Version", |_| async move { Ok(ArgValue::Int(2)) });
    assert_eq!(methods.len(), 1);
    let result = methods.invoke("Version", Vec::new()).await.unwrap();
    assert_eq!(result, ArgValue::Int(2));
}
