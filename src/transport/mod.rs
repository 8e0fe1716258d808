//! Transport abstraction for participant message delivery.
//!
//! Participants never talk to each other directly. They hand an
//! [`Envelope`] to a [`Transport`], which lets the harness decide whether and
//! when the message arrives.
//!
//! # Available Transports
//!
//! - [`DirectTransport`]: delivers straight into the target's inbox
//! - [`PartitionTransport`]: wraps another transport and injects jitter and
//!   network partitions
//! - [`NoopTransport`]: discards every message

use std::{collections::HashMap, fmt::Debug};

use async_channel::{Sender, TrySendError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::node::NodeName;

mod partition;

pub use partition::{Partition, PartitionTransport, TransportStats, TransportStatsSnapshot};

/// A message in flight between two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<M> {
    /// Sending node.
    pub from: NodeName,
    /// Receiving node.
    pub to: NodeName,
    /// Payload.
    pub message: M,
}

impl<M> Envelope<M> {
    /// Create an envelope.
    pub fn new(from: NodeName, to: NodeName, message: M) -> Self {
        Self { from, to, message }
    }
}

/// Inbox a participant receives on while attached.
pub type Inbox<M> = Sender<Envelope<M>>;

/// Unicast, fire-and-forget message delivery between named participants.
///
/// Delivery is best effort: a message to a detached or unknown node is
/// silently lost, as it would be on a real network.
#[auto_impl::auto_impl(Box, Arc)]
pub trait Transport<M>: Send + Sync + 'static
where
    M: Send + 'static,
{
    /// Register `node` so messages addressed to it land in `inbox`.
    fn attach(&self, node: &NodeName, inbox: Inbox<M>);

    /// Unregister `node`. Messages to it are dropped until it re-attaches.
    fn detach(&self, node: &NodeName);

    /// Whether `node` is currently attached.
    fn is_attached(&self, node: &NodeName) -> bool;

    /// Send an envelope to `envelope.to`.
    fn send(&self, envelope: Envelope<M>);
}

/// Pass-through transport delivering into registered inboxes.
#[derive(Debug)]
pub struct DirectTransport<M> {
    inboxes: RwLock<HashMap<NodeName, Inbox<M>>>,
}

impl<M> DirectTransport<M> {
    /// Create a transport with no attached nodes.
    pub fn new() -> Self {
        Self {
            inboxes: RwLock::new(HashMap::new()),
        }
    }

    /// Number of attached nodes.
    pub fn attached_count(&self) -> usize {
        self.inboxes.read().len()
    }
}

impl<M> Default for DirectTransport<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Transport<M> for DirectTransport<M>
where
    M: Debug + Send + 'static,
{
    fn attach(&self, node: &NodeName, inbox: Inbox<M>) {
        self.inboxes.write().insert(node.clone(), inbox);
    }

    fn detach(&self, node: &NodeName) {
        if let Some(inbox) = self.inboxes.write().remove(node) {
            inbox.close();
        }
    }

    fn is_attached(&self, node: &NodeName) -> bool {
        self.inboxes.read().contains_key(node)
    }

    fn send(&self, envelope: Envelope<M>) {
        let inbox = match self.inboxes.read().get(&envelope.to) {
            Some(inbox) => inbox.clone(),
            None => {
                tracing::trace!(from = %envelope.from, to = %envelope.to, "target detached, message lost");
                return;
            }
        };
        match inbox.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(envelope)) => {
                tracing::trace!(from = %envelope.from, to = %envelope.to, "inbox full, message lost");
            }
            Err(TrySendError::Closed(envelope)) => {
                tracing::trace!(from = %envelope.from, to = %envelope.to, "inbox closed, message lost");
            }
        }
    }
}

/// A no-op transport that discards all messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransport;

impl<M: Send + 'static> Transport<M> for NoopTransport {
    fn attach(&self, _node: &NodeName, _inbox: Inbox<M>) {}

    fn detach(&self, _node: &NodeName) {}

    fn is_attached(&self, _node: &NodeName) -> bool {
        false
    }

    fn send(&self, _envelope: Envelope<M>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(from: &str, to: &str, message: u32) -> Envelope<u32> {
        Envelope::new(NodeName::from(from), NodeName::from(to), message)
    }

    #[tokio::test]
    async fn test_direct_transport_delivers() {
        let transport = DirectTransport::new();
        let (tx, rx) = async_channel::bounded(16);
        transport.attach(&NodeName::from("b"), tx);

        transport.send(envelope("a", "b", 42));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.from.as_str(), "a");
        assert_eq!(received.message, 42);
    }

    #[tokio::test]
    async fn test_direct_transport_detach_drops() {
        let transport = DirectTransport::new();
        let b = NodeName::from("b");
        let (tx, rx) = async_channel::bounded(16);
        transport.attach(&b, tx);
        assert!(transport.is_attached(&b));

        transport.detach(&b);
        assert!(!transport.is_attached(&b));
        transport.send(envelope("a", "b", 1));

        // The old inbox is closed and empty.
        assert!(rx.recv().await.is_err());
        assert_eq!(transport.attached_count(), 0);
    }

    #[test]
    fn test_direct_transport_full_inbox_drops() {
        let transport = DirectTransport::new();
        let (tx, rx) = async_channel::bounded(1);
        transport.attach(&NodeName::from("b"), tx);

        transport.send(envelope("a", "b", 1));
        transport.send(envelope("a", "b", 2));

        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv().unwrap().message, 1);
    }

    #[test]
    fn test_noop_transport() {
        let transport = NoopTransport;
        Transport::<u32>::send(&transport, envelope("a", "b", 1));
        assert!(!Transport::<u32>::is_attached(&transport, &NodeName::from("b")));
    }
}
