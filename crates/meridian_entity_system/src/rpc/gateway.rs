//! Entity call gateway: the outbound RPC surface of an [`Entity`].
//!
//! Call lifecycle: `Created -> Pending (record stored, timer armed) ->
//! {Resolved | TimedOut}`. `notify` never enters `Pending`; it has no
//! lifecycle beyond the send. The local-vs-remote routing decision lives in
//! the registry behind the [`OutboundHook`] seam, so the gateway itself never
//! knows whether a target is in-process.

use super::{PendingCallTable, RpcError};
use crate::args::{ArgValue, FromArg};
use crate::config::DEFAULT_CALL_TIMEOUT;
use crate::entity::Entity;
use crate::messages::EntityRpcCall;
use crate::transport::TransportError;
use crate::types::Mailbox;
use async_trait::async_trait;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Outbound seam between an entity and its hosting process.
///
/// The hook receives every outbound call message and decides how it travels:
/// in-process dispatch for locally hosted targets, transport send otherwise.
#[async_trait]
pub trait OutboundHook: Send + Sync {
    /// Forwards one outbound call message toward its target.
    async fn forward_call(&self, call: EntityRpcCall) -> Result<(), RpcError>;
}

impl Entity {
    /// Fire-and-forget low-level send.
    ///
    /// Allocates a fresh call id but stores no pending record, so any reply
    /// that does come back is dropped as stale. Prefer [`notify`](Self::notify)
    /// unless the remote side genuinely expects a reply-carrying message shape.
    pub async fn send(
        &self,
        target: Mailbox,
        method: &str,
        args: Vec<ArgValue>,
    ) -> Result<(), RpcError> {
        let call = self.build_call(target, method, args, false).await;
        self.forward(call).await
    }

    /// Invokes `method` on `target` and awaits the untyped reply, using the
    /// default 1000 ms timeout.
    pub async fn call(
        &self,
        target: Mailbox,
        method: &str,
        args: Vec<ArgValue>,
    ) -> Result<ArgValue, RpcError> {
        self.call_with_timeout(target, method, args, DEFAULT_CALL_TIMEOUT)
            .await
    }

    /// Invokes `method` on `target` and awaits the untyped reply.
    pub async fn call_with_timeout(
        &self,
        target: Mailbox,
        method: &str,
        args: Vec<ArgValue>,
        timeout: Duration,
    ) -> Result<ArgValue, RpcError> {
        let (_, payload) = self.dispatch_call(target, method, args, timeout).await?;
        Ok(payload)
    }

    /// Invokes `method` on `target` and decodes the reply as `T`, using the
    /// default 1000 ms timeout. A payload that does not decode as `T` is a
    /// hard [`RpcError::TypeMismatch`] failure.
    pub async fn call_as<T: FromArg>(
        &self,
        target: Mailbox,
        method: &str,
        args: Vec<ArgValue>,
    ) -> Result<T, RpcError> {
        self.call_as_with_timeout(target, method, args, DEFAULT_CALL_TIMEOUT)
            .await
    }

    /// Typed variant of [`call_with_timeout`](Self::call_with_timeout).
    pub async fn call_as_with_timeout<T: FromArg>(
        &self,
        target: Mailbox,
        method: &str,
        args: Vec<ArgValue>,
        timeout: Duration,
    ) -> Result<T, RpcError> {
        let (call_id, payload) = self.dispatch_call(target, method, args, timeout).await?;
        T::from_arg(payload).map_err(|source| RpcError::TypeMismatch { call_id, source })
    }

    /// Notify-only invocation: the remote executes the method but never sends
    /// a reply, and no pending record is created, so this path can neither
    /// time out nor leak pending entries.
    pub async fn notify(
        &self,
        target: Mailbox,
        method: &str,
        args: Vec<ArgValue>,
    ) -> Result<(), RpcError> {
        let call = self.build_call(target, method, args, true).await;
        self.forward(call).await?;
        self.stats.notifies_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Shared reply-expected call path: register, send, await resolution.
    async fn dispatch_call(
        &self,
        target: Mailbox,
        method: &str,
        args: Vec<ArgValue>,
        timeout: Duration,
    ) -> Result<(u64, ArgValue), RpcError> {
        let call = self.build_call(target, method, args, false).await;
        let call_id = call.call_id;
        let receiver = self.pending_table().register(call_id, timeout);

        if let Err(err) = self.forward(call).await {
            // The message never left; tear the record down so the failed send
            // surfaces instead of a later timeout.
            self.pending.discard(call_id);
            return Err(err);
        }
        self.stats.calls_sent.fetch_add(1, Ordering::Relaxed);

        match receiver.await {
            Ok(outcome) => outcome.map(|payload| (call_id, payload)),
            Err(_) => Err(RpcError::Abandoned { call_id }),
        }
    }

    async fn build_call(
        &self,
        target: Mailbox,
        method: &str,
        args: Vec<ArgValue>,
        notify_only: bool,
    ) -> EntityRpcCall {
        EntityRpcCall {
            call_id: self.next_call_id(),
            method: method.to_string(),
            source: self.mailbox().await,
            target,
            args,
            notify_only,
        }
    }

    async fn forward(&self, call: EntityRpcCall) -> Result<(), RpcError> {
        let hook = self.outbound.read().await.clone();
        match hook {
            Some(hook) => hook.forward_call(call).await,
            None => Err(RpcError::Routing(TransportError::NotBound)),
        }
    }

    fn pending_table(&self) -> &Arc<PendingCallTable> {
        &self.pending
    }
}
