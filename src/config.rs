//! Configuration for clusters, transports and the fault scheduler.

use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for a [`Cluster`](crate::Cluster).
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Interval between height samples in
    /// [`wait_for_height`](crate::Cluster::wait_for_height).
    ///
    /// Default: 1s
    pub poll_interval: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl ClusterConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll_interval must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Configuration for a [`PartitionTransport`](crate::PartitionTransport).
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Upper bound of the random delay applied to each message.
    ///
    /// Default: 0 (no jitter)
    pub max_jitter: Duration,

    /// Seed for the jitter source.
    ///
    /// Default: 0
    pub seed: u64,
}

impl TransportConfig {
    /// Create a configuration with defaults (no jitter).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum jitter.
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Set the jitter seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Configuration for the [`FuzzRunner`](crate::FuzzRunner).
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Total run window. Fault injection stops once it has elapsed.
    ///
    /// Default: 25m
    pub duration: Duration,

    /// Interval between fault decisions in the churn variant.
    ///
    /// Default: 3s
    pub tick: Duration,

    /// Seed for every random fault decision.
    ///
    /// Default: 0
    pub seed: u64,

    /// Height added to the target for every wait in the network variant.
    ///
    /// Default: 10
    pub height_step: u64,

    /// The network variant stops once its target reaches this height.
    ///
    /// Default: None (bounded by `duration` only)
    pub max_height: Option<u64>,

    /// Timeout for each majority wait in the network variant.
    ///
    /// Default: 10m
    pub phase_timeout: Duration,

    /// Height every node must advance past the highest observed height once
    /// faults are lifted.
    ///
    /// Default: 5
    pub settle_height: u64,

    /// Timeout for the final settle wait.
    ///
    /// Default: 20m
    pub settle_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(25 * 60),
            tick: Duration::from_secs(3),
            seed: 0,
            height_step: 10,
            max_height: None,
            phase_timeout: Duration::from_secs(10 * 60),
            settle_height: 5,
            settle_timeout: Duration::from_secs(20 * 60),
        }
    }
}

impl RunnerConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Node churn: one stop/start decision every 3s for 30s.
    pub fn churn() -> Self {
        Self {
            duration: Duration::from_secs(30),
            tick: Duration::from_secs(3),
            settle_timeout: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Unreliable network: repeated partitions up to height 200.
    pub fn unreliable_network() -> Self {
        Self {
            duration: Duration::from_secs(60 * 60),
            max_height: Some(200),
            height_step: 10,
            settle_height: 20,
            ..Self::default()
        }
    }

    /// Set the run window.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the tick interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the height step.
    pub fn with_height_step(mut self, step: u64) -> Self {
        self.height_step = step;
        self
    }

    /// Set the maximum target height.
    pub fn with_max_height(mut self, max_height: u64) -> Self {
        self.max_height = Some(max_height);
        self
    }

    /// Set the per-phase timeout.
    pub fn with_phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout = timeout;
        self
    }

    /// Set the settle height and timeout.
    pub fn with_settle(mut self, height: u64, timeout: Duration) -> Self {
        self.settle_height = height;
        self.settle_timeout = timeout;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.tick.is_zero() {
            return Err(Error::Config("tick must be > 0".to_string()));
        }
        if self.duration < self.tick {
            return Err(Error::Config(format!(
                "duration ({:?}) must be at least one tick ({:?})",
                self.duration, self.tick
            )));
        }
        if self.height_step == 0 {
            return Err(Error::Config("height_step must be > 0".to_string()));
        }
        Ok(())
    }
}
