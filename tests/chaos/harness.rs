//! Shared cluster builders for the chaos scenarios.

use std::sync::Arc;
use std::time::Duration;

use bft_chaos::sim::{sim_cluster, SimConfig, SimMessage, SimNode};
use bft_chaos::{
    Cluster, ClusterConfig, DirectTransport, PartitionTransport, Recorder, TransportConfig,
};

/// Round interval of the simulated nodes.
pub const ROUND: Duration = Duration::from_millis(50);

/// Generous timeout for any single height wait.
pub const WAIT: Duration = Duration::from_secs(60);

/// Builder for a simulated cluster with test-friendly timings.
pub struct ClusterBuilder {
    name: String,
    prefix: String,
    count: usize,
    jitter: Duration,
    seed: u64,
    recorder: Option<Arc<dyn Recorder<SimMessage>>>,
}

impl ClusterBuilder {
    pub fn new(name: &str, prefix: &str, count: usize) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            count,
            jitter: Duration::ZERO,
            seed: 0,
            recorder: None,
        }
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn Recorder<SimMessage>>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn build(self) -> Cluster<SimNode> {
        let mut transport = PartitionTransport::new(
            DirectTransport::new(),
            TransportConfig::new()
                .with_max_jitter(self.jitter)
                .with_seed(self.seed),
        );
        if let Some(recorder) = self.recorder {
            transport = transport.with_recorder(recorder);
        }
        sim_cluster(
            self.name,
            &self.prefix,
            self.count,
            Arc::new(transport),
            SimConfig::new().with_round_interval(ROUND),
            ClusterConfig::new().with_poll_interval(Duration::from_millis(100)),
        )
        .expect("valid cluster")
    }
}
