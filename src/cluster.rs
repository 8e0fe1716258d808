//! A named group of participants sharing one fault-injecting transport.
//!
//! [`Cluster`] is the single point of control and observation for a test:
//! it starts and stops nodes, and answers the two correctness questions the
//! harness asks of a cluster under faults.
//!
//! - [`wait_for_height`](Cluster::wait_for_height): did consensus make
//!   progress despite the faults?
//! - [`is_stuck`](Cluster::is_stuck): did the nodes cut off by the faults
//!   really make none?

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use crate::{
    config::ClusterConfig,
    error::{Error, NodeHeight, Progressed, Result},
    node::{ConsensusNode, NodeHandle, NodeName},
    testing::wait_for,
    transport::PartitionTransport,
};

/// A fixed set of named participants and their transport.
///
/// Membership never changes after construction; only the running state of
/// each node does.
pub struct Cluster<N: ConsensusNode> {
    name: String,
    nodes: BTreeMap<NodeName, NodeHandle<N>>,
    transport: Arc<PartitionTransport<N::Message>>,
    config: ClusterConfig,
}

impl<N: ConsensusNode> Cluster<N> {
    /// Create a cluster. All nodes start out stopped.
    ///
    /// Fails if two participants share a name or the config is invalid.
    pub fn new(
        name: impl Into<String>,
        nodes: impl IntoIterator<Item = N>,
        transport: Arc<PartitionTransport<N::Message>>,
        config: ClusterConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut map = BTreeMap::new();
        for node in nodes {
            let name = node.name().clone();
            if map.insert(name.clone(), NodeHandle::new(node)).is_some() {
                return Err(Error::DuplicateNode(name));
            }
        }
        Ok(Self {
            name: name.into(),
            nodes: map,
            transport,
            config,
        })
    }

    /// Cluster name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the cluster has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The shared transport.
    pub fn transport(&self) -> &Arc<PartitionTransport<N::Message>> {
        &self.transport
    }

    /// Cluster configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&NodeHandle<N>> {
        self.nodes.get(name)
    }

    /// All nodes, ordered by name.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeHandle<N>> {
        self.nodes.values()
    }

    /// All node names, ordered.
    pub fn node_names(&self) -> Vec<NodeName> {
        self.nodes.keys().cloned().collect()
    }

    /// Names of running nodes.
    pub fn running_nodes(&self) -> Vec<NodeName> {
        self.filter_names(|n| n.is_running())
    }

    /// Names of stopped nodes.
    pub fn stopped_nodes(&self) -> Vec<NodeName> {
        self.filter_names(|n| !n.is_running())
    }

    fn filter_names(&self, pred: impl Fn(&NodeHandle<N>) -> bool) -> Vec<NodeName> {
        self.nodes
            .iter()
            .filter(|(_, n)| pred(n))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Current height of every node.
    pub fn heights(&self) -> BTreeMap<NodeName, u64> {
        self.nodes
            .iter()
            .map(|(name, n)| (name.clone(), n.height()))
            .collect()
    }

    /// Highest height any node has reached.
    pub fn max_height(&self) -> u64 {
        self.nodes.values().map(|n| n.height()).max().unwrap_or(0)
    }

    /// Start every node. Running nodes are left alone.
    ///
    /// Every node is attempted even if one fails; the first failure is
    /// returned.
    pub fn start(&self) -> Result<()> {
        tracing::info!(cluster = %self.name, nodes = self.nodes.len(), "starting cluster");
        let mut result = Ok(());
        for node in self.nodes.values() {
            if let Err(e) = node.start() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Stop every node. Stopped nodes are left alone.
    pub fn stop(&self) {
        tracing::info!(cluster = %self.name, "stopping cluster");
        for node in self.nodes.values() {
            node.stop();
        }
    }

    /// Start one node.
    pub fn start_node(&self, name: &str) -> Result<()> {
        self.get(name)?.start()
    }

    /// Stop one node.
    pub fn stop_node(&self, name: &str) -> Result<()> {
        self.get(name)?.stop();
        Ok(())
    }

    fn get(&self, name: &str) -> Result<&NodeHandle<N>> {
        self.nodes
            .get(name)
            .ok_or_else(|| Error::NotFound(NodeName::from(name)))
    }

    fn select(&self, subset: Option<&[NodeName]>) -> Result<Vec<&NodeHandle<N>>> {
        match subset {
            None => Ok(self.nodes.values().collect()),
            Some(names) => names.iter().map(|n| self.get(n.as_str())).collect(),
        }
    }

    /// Wait until every selected node has committed at least `height`.
    ///
    /// `subset` of `None` selects every node. Heights are sampled every
    /// [`ClusterConfig::poll_interval`]. On timeout the error names each node
    /// still below the target together with the partition and stopped nodes
    /// in effect at that moment.
    pub async fn wait_for_height(
        &self,
        height: u64,
        timeout: Duration,
        subset: Option<&[NodeName]>,
    ) -> Result<()> {
        let selected = self.select(subset)?;
        let reached = wait_for(
            || selected.iter().all(|n| n.height() >= height),
            timeout,
            self.config.poll_interval,
        )
        .await;

        match reached {
            Ok(elapsed) => {
                tracing::info!(
                    cluster = %self.name,
                    height,
                    nodes = selected.len(),
                    ?elapsed,
                    "height reached"
                );
                Ok(())
            }
            Err(elapsed) => {
                let lagging: Vec<_> = selected
                    .iter()
                    .filter_map(|n| {
                        let current = n.height();
                        (current < height).then(|| NodeHeight {
                            name: n.name().clone(),
                            height: current,
                            running: n.is_running(),
                        })
                    })
                    .collect();
                let err = Error::ConvergenceTimeout {
                    target: height,
                    elapsed,
                    lagging,
                    partition: self.transport.current_partition(),
                    stopped: self.stopped_nodes(),
                };
                tracing::warn!(cluster = %self.name, "{}", err);
                Err(err)
            }
        }
    }

    /// Assert that none of `names` commits anything during `window`.
    ///
    /// Used for nodes that are stopped or cut off by a partition.
    pub async fn is_stuck(&self, window: Duration, names: &[NodeName]) -> Result<()> {
        let selected = self.select(Some(names))?;
        let before: Vec<u64> = selected.iter().map(|n| n.height()).collect();
        tokio::time::sleep(window).await;

        let progressed: Vec<_> = selected
            .iter()
            .zip(before)
            .filter_map(|(n, before)| {
                let after = n.height();
                (after != before).then(|| Progressed {
                    name: n.name().clone(),
                    before,
                    after,
                })
            })
            .collect();

        if progressed.is_empty() {
            tracing::debug!(cluster = %self.name, nodes = names.len(), ?window, "nodes stuck as expected");
            Ok(())
        } else {
            Err(Error::StuckAssertion {
                window,
                progressed,
            })
        }
    }
}

impl<N: ConsensusNode> fmt::Debug for Cluster<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.name)
            .field("nodes", &self.nodes.values().collect::<Vec<_>>())
            .field("transport", &self.transport)
            .finish()
    }
}
