//! In-process BFT participant for driving the harness end to end.
//!
//! [`SimNode`] runs a deliberately small quorum protocol: every round each
//! node votes for the height after its last commit, and commits that height
//! once it holds votes from a quorum of `2f + 1` distinct nodes. Votes carry
//! the sender's committed height, so a node that fell behind (restarted,
//! or cut off by a partition) catches up as soon as it hears from a peer
//! that is ahead.
//!
//! The protocol is honest-only. It exists to give the harness a participant
//! whose liveness depends on quorum availability in the same way a real BFT
//! node's does: a partition minority or a cluster missing more than `f`
//! nodes stops committing.

use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_channel::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::{
    cluster::Cluster,
    config::ClusterConfig,
    error::{Error, Result},
    node::{node_names, ConsensusNode, NodeName},
    transport::{Envelope, PartitionTransport, Transport},
};

/// Largest number of faulty participants `n` nodes tolerate: `floor((n-1)/3)`.
pub fn max_faulty(n: usize) -> usize {
    n.saturating_sub(1) / 3
}

/// Votes needed to commit a height: `2f + 1`.
pub fn quorum(n: usize) -> usize {
    2 * max_faulty(n) + 1
}

/// Messages exchanged by [`SimNode`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimMessage {
    /// Vote for `height`.
    Vote {
        /// Height being voted for.
        height: u64,
        /// Sender's last committed height.
        committed: u64,
    },
}

/// Configuration for [`SimNode`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Interval between vote broadcasts.
    ///
    /// Default: 100ms
    pub round_interval: Duration,

    /// Capacity of each node's inbox. Messages beyond it are lost.
    ///
    /// Default: 4096
    pub inbox_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            round_interval: Duration::from_millis(100),
            inbox_capacity: 4096,
        }
    }
}

impl SimConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the round interval.
    pub fn with_round_interval(mut self, interval: Duration) -> Self {
        self.round_interval = interval;
        self
    }

    /// Set the inbox capacity.
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity.max(1);
        self
    }
}

struct SimInner {
    name: NodeName,
    peers: Vec<NodeName>,
    quorum: usize,
    config: SimConfig,
    transport: Arc<dyn Transport<SimMessage>>,
    running: AtomicBool,
    committed: AtomicU64,
    /// Voters for `committed + 1`. Holding this lock is required to commit.
    votes: Mutex<HashSet<NodeName>>,
}

impl SimInner {
    async fn run(self: Arc<Self>, inbox: Receiver<Envelope<SimMessage>>) {
        let period = self.config.round_interval.max(Duration::from_millis(1));
        let mut round = tokio::time::interval(period);
        round.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = round.tick() => self.broadcast_vote(),
                received = inbox.recv() => match received {
                    Ok(envelope) => self.handle(envelope),
                    // Inbox closed: detached from the transport.
                    Err(_) => break,
                },
            }
        }
        tracing::trace!(node = %self.name, "node task exited");
    }

    fn reset_votes(&self, votes: &mut HashSet<NodeName>) {
        votes.clear();
        votes.insert(self.name.clone());
    }

    fn try_commit(&self, votes: &mut HashSet<NodeName>) {
        while votes.len() >= self.quorum {
            let height = self.committed.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::trace!(node = %self.name, height, "committed");
            self.reset_votes(votes);
        }
    }

    fn broadcast_vote(&self) {
        let committed = {
            let mut votes = self.votes.lock();
            if !self.running.load(Ordering::Acquire) {
                return;
            }
            self.try_commit(&mut votes);
            self.committed.load(Ordering::Acquire)
        };
        let message = SimMessage::Vote {
            height: committed + 1,
            committed,
        };
        for peer in &self.peers {
            self.transport.send(Envelope::new(
                self.name.clone(),
                peer.clone(),
                message.clone(),
            ));
        }
    }

    fn handle(&self, envelope: Envelope<SimMessage>) {
        let SimMessage::Vote { height, committed } = envelope.message;
        let mut votes = self.votes.lock();
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let mine = self.committed.load(Ordering::Acquire);
        if committed > mine {
            self.committed.store(committed, Ordering::Release);
            self.reset_votes(&mut votes);
            tracing::trace!(node = %self.name, from = %envelope.from, height = committed, "caught up");
        }
        if height == self.committed.load(Ordering::Acquire) + 1 {
            votes.insert(envelope.from);
            self.try_commit(&mut votes);
        }
    }
}

/// Simulated BFT participant.
pub struct SimNode {
    inner: Arc<SimInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimNode {
    /// Create a participant named `name` in a cluster of `members`.
    ///
    /// `members` may include `name`; the quorum is computed over all of them.
    pub fn new(
        name: NodeName,
        members: &[NodeName],
        transport: Arc<dyn Transport<SimMessage>>,
        config: SimConfig,
    ) -> Self {
        let peers: Vec<_> = members.iter().filter(|m| **m != name).cloned().collect();
        let quorum = quorum(peers.len() + 1);
        Self {
            inner: Arc::new(SimInner {
                name,
                peers,
                quorum,
                config,
                transport,
                running: AtomicBool::new(false),
                committed: AtomicU64::new(0),
                votes: Mutex::new(HashSet::new()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Votes this node needs to commit.
    pub fn quorum(&self) -> usize {
        self.inner.quorum
    }
}

impl ConsensusNode for SimNode {
    type Message = SimMessage;

    fn name(&self) -> &NodeName {
        &self.inner.name
    }

    /// Attach and spawn the node task on the current tokio runtime.
    ///
    /// Fails with [`Error::NodeStart`] outside a runtime.
    fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::NodeStart {
            node: self.inner.name.clone(),
            reason: e.to_string(),
        })?;
        let (tx, rx) = async_channel::bounded(self.inner.config.inbox_capacity);
        {
            let mut votes = self.inner.votes.lock();
            self.inner.reset_votes(&mut votes);
            self.inner.running.store(true, Ordering::Release);
        }
        self.inner.transport.attach(&self.inner.name, tx);
        let task = runtime.spawn(self.inner.clone().run(rx));
        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn stop(&self) {
        {
            let _votes = self.inner.votes.lock();
            self.inner.running.store(false, Ordering::Release);
        }
        self.inner.transport.detach(&self.inner.name);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    fn height(&self) -> u64 {
        self.inner.committed.load(Ordering::Acquire)
    }
}

impl Drop for SimNode {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl fmt::Debug for SimNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimNode")
            .field("name", &self.inner.name)
            .field("quorum", &self.inner.quorum)
            .field("running", &self.is_running())
            .field("height", &self.height())
            .finish()
    }
}

/// Build a cluster of `count` [`SimNode`]s named `{prefix}_0 .. {prefix}_{count-1}`.
///
/// All nodes share `transport`. The cluster is returned stopped.
pub fn sim_cluster(
    name: impl Into<String>,
    prefix: &str,
    count: usize,
    transport: Arc<PartitionTransport<SimMessage>>,
    sim: SimConfig,
    config: ClusterConfig,
) -> Result<Cluster<SimNode>> {
    let members = node_names(&format!("{}_", prefix), 0..count);
    let nodes: Vec<_> = members
        .iter()
        .map(|member| {
            SimNode::new(
                member.clone(),
                &members,
                transport.clone() as Arc<dyn Transport<SimMessage>>,
                sim.clone(),
            )
        })
        .collect();
    Cluster::new(name, nodes, transport, config)
}
