//! In-memory loopback transport.
//!
//! Connects any number of logical "processes" (endpoint = host + port) inside
//! one OS process. Frames are serialized and deserialized on the way through,
//! so anything that survives the loopback also survives a real wire. Used by
//! the integration tests and available to hosts running single-process
//! topologies.

use super::{InboundDispatcher, Transport, TransportError};
use crate::messages::WireMessage;
use crate::types::Mailbox;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Shared routing fabric between loopback endpoints.
#[derive(Default)]
pub struct LoopbackNetwork {
    endpoints: DashMap<(String, u16), mpsc::UnboundedSender<Vec<u8>>>,
}

impl std::fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackNetwork")
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

impl LoopbackNetwork {
    /// Creates an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attaches an endpoint at `host:port`, pumping inbound frames into
    /// `dispatcher`, and returns the transport handle for that endpoint.
    pub fn attach(
        self: &Arc<Self>,
        host: impl Into<String>,
        port: u16,
        dispatcher: Arc<InboundDispatcher>,
    ) -> Arc<LoopbackTransport> {
        let host = host.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Vec<u8>>();
        self.endpoints.insert((host.clone(), port), sender);

        tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                if let Err(err) = dispatcher.dispatch_frame(&frame).await {
                    warn!(%host, port, error = %err, "loopback frame dropped");
                }
            }
        });

        Arc::new(LoopbackTransport {
            network: Arc::clone(self),
            frames_sent: AtomicU64::new(0),
        })
    }

    /// Detaches an endpoint; frames toward it fail with `NoRoute` afterwards.
    pub fn detach(&self, host: &str, port: u16) {
        self.endpoints.remove(&(host.to_string(), port));
    }
}

/// Transport handle bound to one loopback endpoint.
#[derive(Debug)]
pub struct LoopbackTransport {
    network: Arc<LoopbackNetwork>,
    frames_sent: AtomicU64,
}

impl LoopbackTransport {
    /// Number of frames this handle has pushed onto the network, for tests
    /// asserting that a code path never touched the transport.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, target: &Mailbox, message: WireMessage) -> Result<(), TransportError> {
        let frame = serde_json::to_vec(&message)?;
        let sender = self
            .network
            .endpoints
            .get(&(target.host.clone(), target.port))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::NoRoute(target.clone()))?;
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        sender.send(frame).map_err(|_| {
            TransportError::ConnectionClosed(format!("{}:{}", target.host, target.port))
        })
    }
}
