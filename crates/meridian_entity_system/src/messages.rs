//! # Wire Messages
//!
//! The three message kinds the core produces and consumes across the transport
//! boundary: entity RPC calls, entity RPC results, and property sync batches.
//!
//! Exact framing is the transport's concern; these types only fix the field
//! identity each message must preserve. All of them serialize through serde so
//! any format that round-trips JSON-like data is acceptable on the wire.

use crate::args::ArgValue;
use crate::sync::record::SyncOp;
use crate::types::Mailbox;
use serde::{Deserialize, Serialize};

/// An outbound or inbound entity RPC invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRpcCall {
    /// Correlation id, unique within the source entity's lifetime
    pub call_id: u64,
    /// Name of the method to invoke on the target entity
    pub method: String,
    /// Mailbox of the calling entity, used to route the reply
    pub source: Mailbox,
    /// Mailbox of the entity being called
    pub target: Mailbox,
    /// Encoded argument list
    pub args: Vec<ArgValue>,
    /// When true the remote executes the method but never sends a reply
    pub notify_only: bool,
}

/// The reply to an [`EntityRpcCall`], tagged with the original call id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRpcResult {
    /// Correlation id of the call this result answers
    pub call_id: u64,
    /// Mailbox of the original caller
    pub target: Mailbox,
    /// Encoded return value of the method
    pub payload: ArgValue,
}

/// A batch of coalesced sync operation records for one replicated property,
/// destined for one shadow entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySyncBatch {
    /// Mailbox of the shadow entity that should apply the records
    pub target: Mailbox,
    /// Dot-addressed property path within the owner's property tree
    pub path: String,
    /// Minimal operation sequence reproducing the net change since last flush
    pub records: Vec<SyncOp>,
}

/// Envelope for everything the core hands to (or receives from) a transport.
///
/// The tag doubles as the dispatch key a transport implementation uses to route
/// inbound frames to the registered handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WireMessage {
    /// Entity RPC call or notify
    RpcCall(EntityRpcCall),
    /// Entity RPC result
    RpcResult(EntityRpcResult),
    /// Property sync command batch
    SyncBatch(PropertySyncBatch),
}

impl WireMessage {
    /// Mailbox the message should be delivered toward.
    pub fn target(&self) -> &Mailbox {
        match self {
            WireMessage::RpcCall(call) => &call.target,
            WireMessage::RpcResult(result) => &result.target,
            WireMessage::SyncBatch(batch) => &batch.target,
        }
    }

    /// Correlation id for call/result traffic; sync batches are uncorrelated.
    pub fn correlation_id(&self) -> Option<u64> {
        match self {
            WireMessage::RpcCall(call) => Some(call.call_id),
            WireMessage::RpcResult(result) => Some(result.call_id),
            WireMessage::SyncBatch(_) => None,
        }
    }

    /// Stable name of the message kind, used for logging and dispatch.
    pub fn kind_name(&self) -> &'static str {
        match self {
            WireMessage::RpcCall(_) => "rpc_call",
            WireMessage::RpcResult(_) => "rpc_result",
            WireMessage::SyncBatch(_) => "sync_batch",
        }
    }
}
