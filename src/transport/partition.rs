//! Fault-injecting transport decorator.
//!
//! [`PartitionTransport`] wraps an inner [`Transport`] and applies two faults
//! to every message:
//!
//! - **Jitter**: a delay drawn uniformly from `[0, max_jitter]` per message,
//!   so two messages sent back to back may arrive in either order.
//! - **Partition**: two disjoint groups of nodes that cannot reach each other.
//!
//! The partition is checked when a message is actually handed to the inner
//! transport, not when it is sent. A partition installed while a message is
//! still delayed suppresses that message.

use std::{
    collections::BTreeSet,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{Envelope, Inbox, Transport};
use crate::{
    config::TransportConfig,
    error::{Error, Result},
    node::NodeName,
    replay::Recorder,
};

/// Two disjoint groups of nodes denied cross-group delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    minority: BTreeSet<NodeName>,
    majority: BTreeSet<NodeName>,
}

impl Partition {
    /// Build a partition from two groups.
    ///
    /// Fails with [`Error::InvalidPartition`] if a node is in both groups.
    pub fn new(
        minority: impl IntoIterator<Item = NodeName>,
        majority: impl IntoIterator<Item = NodeName>,
    ) -> Result<Self> {
        let minority: BTreeSet<_> = minority.into_iter().collect();
        let majority: BTreeSet<_> = majority.into_iter().collect();
        if let Some(node) = minority.intersection(&majority).next() {
            return Err(Error::InvalidPartition { node: node.clone() });
        }
        Ok(Self { minority, majority })
    }

    /// First group.
    pub fn minority(&self) -> &BTreeSet<NodeName> {
        &self.minority
    }

    /// Second group.
    pub fn majority(&self) -> &BTreeSet<NodeName> {
        &self.majority
    }

    /// Whether `node` is in either group.
    pub fn contains(&self, node: &NodeName) -> bool {
        self.minority.contains(node) || self.majority.contains(node)
    }

    /// Whether a message from `from` to `to` crosses the split.
    ///
    /// A node in neither group is reachable by everyone.
    pub fn blocks(&self, from: &NodeName, to: &NodeName) -> bool {
        (self.minority.contains(from) && self.majority.contains(to))
            || (self.majority.contains(from) && self.minority.contains(to))
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minority = self
            .minority
            .iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "{}/{} (minority [{}])",
            self.majority.len(),
            self.minority.len(),
            minority
        )
    }
}

/// Delivery counters for a [`PartitionTransport`].
#[derive(Debug, Default)]
pub struct TransportStats {
    /// Messages handed to the transport.
    pub messages_total: AtomicU64,
    /// Messages passed on to the inner transport.
    pub messages_delivered: AtomicU64,
    /// Messages suppressed by a partition.
    pub messages_partitioned: AtomicU64,
    /// Messages suppressed because the sender stopped before delivery.
    pub messages_orphaned: AtomicU64,
    /// Messages delivered with a non-zero delay.
    pub messages_delayed: AtomicU64,
}

impl TransportStats {
    /// Create new stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_message(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_delivery(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn record_partition_block(&self) {
        self.messages_partitioned.fetch_add(1, Ordering::Relaxed);
    }

    fn record_orphan(&self) {
        self.messages_orphaned.fetch_add(1, Ordering::Relaxed);
    }

    fn record_delay(&self) {
        self.messages_delayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of stats.
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            messages_total: self.messages_total.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_partitioned: self.messages_partitioned.load(Ordering::Relaxed),
            messages_orphaned: self.messages_orphaned.load(Ordering::Relaxed),
            messages_delayed: self.messages_delayed.load(Ordering::Relaxed),
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        self.messages_total.store(0, Ordering::Relaxed);
        self.messages_delivered.store(0, Ordering::Relaxed);
        self.messages_partitioned.store(0, Ordering::Relaxed);
        self.messages_orphaned.store(0, Ordering::Relaxed);
        self.messages_delayed.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of [`TransportStats`] at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportStatsSnapshot {
    /// Messages handed to the transport.
    pub messages_total: u64,
    /// Messages passed on to the inner transport.
    pub messages_delivered: u64,
    /// Messages suppressed by a partition.
    pub messages_partitioned: u64,
    /// Messages suppressed because the sender stopped.
    pub messages_orphaned: u64,
    /// Messages delivered with a non-zero delay.
    pub messages_delayed: u64,
}

impl TransportStatsSnapshot {
    /// Messages not yet resolved either way (still delayed).
    pub fn in_flight(&self) -> u64 {
        self.messages_total
            .saturating_sub(self.messages_delivered)
            .saturating_sub(self.messages_partitioned)
            .saturating_sub(self.messages_orphaned)
    }
}

struct Shared<M> {
    inner: Arc<dyn Transport<M>>,
    /// Active split, swapped as a whole so readers never see half of one.
    partition: RwLock<Option<Arc<Partition>>>,
    stats: TransportStats,
}

impl<M: Send + 'static> Shared<M> {
    fn deliver(&self, envelope: Envelope<M>) {
        // Held until the hand-off so a concurrent `partition()` applies
        // either entirely before or entirely after this message.
        let partition = self.partition.read();
        let blocked = partition
            .as_ref()
            .is_some_and(|p| p.blocks(&envelope.from, &envelope.to));
        if blocked {
            self.stats.record_partition_block();
            tracing::trace!(from = %envelope.from, to = %envelope.to, "message crosses partition, dropped");
            return;
        }
        if !self.inner.is_attached(&envelope.from) {
            self.stats.record_orphan();
            tracing::trace!(from = %envelope.from, to = %envelope.to, "sender stopped, dropped");
            return;
        }
        self.stats.record_delivery();
        self.inner.send(envelope);
    }
}

/// Transport decorator injecting jitter and partitions.
pub struct PartitionTransport<M> {
    shared: Arc<Shared<M>>,
    max_jitter: RwLock<Duration>,
    rng: Mutex<StdRng>,
    recorder: Option<Arc<dyn Recorder<M>>>,
}

impl<M> PartitionTransport<M>
where
    M: Send + Sync + 'static,
{
    /// Wrap `inner` with the faults described by `config`.
    pub fn new(inner: impl Transport<M>, config: TransportConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Arc::new(inner),
                partition: RwLock::new(None),
                stats: TransportStats::new(),
            }),
            max_jitter: RwLock::new(config.max_jitter),
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            recorder: None,
        }
    }

    /// Record every observed message into `recorder`.
    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder<M>>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Install a partition between two disjoint groups.
    ///
    /// Replaces any active partition.
    pub fn partition(
        &self,
        minority: impl IntoIterator<Item = NodeName>,
        majority: impl IntoIterator<Item = NodeName>,
    ) -> Result<()> {
        let partition = Partition::new(minority, majority)?;
        tracing::info!(partition = %partition, "partition installed");
        *self.shared.partition.write() = Some(Arc::new(partition));
        Ok(())
    }

    /// Clear any active partition.
    pub fn reset(&self) {
        if self.shared.partition.write().take().is_some() {
            tracing::info!("partition reset");
        }
    }

    /// The active partition, if any.
    pub fn current_partition(&self) -> Option<Partition> {
        self.shared.partition.read().as_deref().cloned()
    }

    /// Whether a message from `from` to `to` would currently be dropped.
    pub fn is_partitioned(&self, from: &NodeName, to: &NodeName) -> bool {
        self.shared
            .partition
            .read()
            .as_ref()
            .is_some_and(|p| p.blocks(from, to))
    }

    /// Change the maximum per-message jitter.
    pub fn set_max_jitter(&self, max_jitter: Duration) {
        *self.max_jitter.write() = max_jitter;
    }

    /// Current maximum per-message jitter.
    pub fn max_jitter(&self) -> Duration {
        *self.max_jitter.read()
    }

    /// Delivery statistics.
    pub fn stats(&self) -> TransportStatsSnapshot {
        self.shared.stats.snapshot()
    }

    fn draw_jitter(&self) -> Duration {
        let max = *self.max_jitter.read();
        if max.is_zero() {
            return Duration::ZERO;
        }
        let micros = self
            .rng
            .lock()
            .random_range(0..=max.as_micros().min(u64::MAX as u128) as u64);
        Duration::from_micros(micros)
    }
}

impl<M> Transport<M> for PartitionTransport<M>
where
    M: Send + Sync + 'static,
{
    fn attach(&self, node: &NodeName, inbox: Inbox<M>) {
        self.shared.inner.attach(node, inbox);
    }

    fn detach(&self, node: &NodeName) {
        self.shared.inner.detach(node);
    }

    fn is_attached(&self, node: &NodeName) -> bool {
        self.shared.inner.is_attached(node)
    }

    fn send(&self, envelope: Envelope<M>) {
        self.shared.stats.record_message();
        if let Some(recorder) = &self.recorder {
            recorder.record(&envelope);
        }

        let delay = self.draw_jitter();
        if delay.is_zero() {
            self.shared.deliver(envelope);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                self.shared.stats.record_delay();
                let shared = self.shared.clone();
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.deliver(envelope);
                });
            }
            Err(_) => {
                tracing::debug!("no runtime available for delayed delivery, delivering now");
                self.shared.deliver(envelope);
            }
        }
    }
}

impl<M> fmt::Debug for PartitionTransport<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionTransport")
            .field("partition", &*self.shared.partition.read())
            .field("max_jitter", &*self.max_jitter.read())
            .field("stats", &self.shared.stats.snapshot())
            .finish()
    }
}
