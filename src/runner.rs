//! Fault scheduler for BFT clusters.
//!
//! [`FuzzRunner`] injects random faults into a [`Cluster`] for a bounded run
//! window while keeping the number of unavailable nodes within the cluster's
//! [fault budget](fault_budget). Two variants are provided:
//!
//! - [`run_churn`](FuzzRunner::run_churn): on every tick pick a random node
//!   and flip it between running and stopped.
//! - [`run_network`](FuzzRunner::run_network): repeatedly partition off a
//!   random minority, drop some of the majority, and require the remaining
//!   majority to keep committing.
//!
//! Every random decision comes from the runner's own seeded RNG, so a run is
//! reproducible from its seed as far as the decisions go.
//!
//! Whatever the outcome, a run ends by clearing the partition and starting
//! every node before it returns.

use std::fmt;

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use tokio::time::Instant;

use crate::{
    cluster::Cluster,
    config::RunnerConfig,
    error::{Error, Result},
    node::{ConsensusNode, NodeName},
    testing::execute_every,
};

/// Number of nodes that may be unavailable at once: `floor(n/3) - 1`,
/// saturating at zero.
pub fn fault_budget(n: usize) -> usize {
    (n / 3).saturating_sub(1)
}

/// Outcome of a single churn tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChurnAction {
    /// The chosen node was running and has been stopped.
    Stop(NodeName),
    /// The chosen node was stopped and has been started.
    Start(NodeName),
    /// The chosen node was running but stopping it would exceed the budget.
    Hold(NodeName),
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Seed the runner was created with.
    pub seed: u64,
    /// Fault decisions taken (churn ticks or network phases).
    pub ticks: u64,
    /// Nodes stopped by the runner.
    pub stops: u64,
    /// Nodes started by the runner.
    pub starts: u64,
    /// Partitions installed.
    pub partitions: u64,
    /// Largest number of simultaneously unavailable nodes observed.
    pub max_unavailable: usize,
    /// Lowest node height once the cluster settled.
    pub final_height: u64,
}

impl RunReport {
    fn observe(&mut self, unavailable: usize) {
        self.max_unavailable = self.max_unavailable.max(unavailable);
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seed {}: {} ticks, {} stops, {} starts, {} partitions, max unavailable {}, final height {}",
            self.seed,
            self.ticks,
            self.stops,
            self.starts,
            self.partitions,
            self.max_unavailable,
            self.final_height
        )
    }
}

/// Randomized fault scheduler.
pub struct FuzzRunner {
    config: RunnerConfig,
    rng: StdRng,
}

impl FuzzRunner {
    /// Create a runner whose RNG is seeded from [`RunnerConfig::seed`].
    pub fn new(config: RunnerConfig) -> Result<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }

    /// Create a runner drawing decisions from a caller-supplied RNG.
    pub fn with_rng(config: RunnerConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, rng })
    }

    /// Runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Nodes currently unavailable: stopped, or running inside the
    /// partition minority.
    pub fn unavailable<N: ConsensusNode>(cluster: &Cluster<N>) -> usize {
        let partition = cluster.transport().current_partition();
        cluster
            .nodes()
            .filter(|n| {
                !n.is_running()
                    || partition
                        .as_ref()
                        .is_some_and(|p| p.minority().contains(n.name()))
            })
            .count()
    }

    /// Take one churn decision.
    ///
    /// Picks a node uniformly at random. A running node is stopped only if
    /// that keeps [`unavailable`](Self::unavailable) within `budget`; a
    /// stopped node is always started. Returns `None` for an empty cluster
    /// and an error if the chosen node fails to start.
    pub fn churn_step<N: ConsensusNode>(
        &mut self,
        cluster: &Cluster<N>,
        budget: usize,
    ) -> Result<Option<ChurnAction>> {
        if cluster.is_empty() {
            return Ok(None);
        }
        let index = self.rng.random_range(0..cluster.len());
        let Some(node) = cluster.nodes().nth(index) else {
            return Ok(None);
        };
        let name = node.name().clone();

        let action = if !node.is_running() {
            node.start()?;
            ChurnAction::Start(name)
        } else if Self::unavailable(cluster) < budget {
            node.stop();
            ChurnAction::Stop(name)
        } else {
            ChurnAction::Hold(name)
        };

        match &action {
            ChurnAction::Start(name) => tracing::info!(node = %name, "churn: start"),
            ChurnAction::Stop(name) => tracing::info!(node = %name, "churn: stop"),
            ChurnAction::Hold(name) => {
                tracing::debug!(node = %name, budget, "churn: budget exhausted, keeping node")
            }
        }
        Ok(Some(action))
    }

    /// Run the churn variant for [`RunnerConfig::duration`], one decision
    /// per [`RunnerConfig::tick`].
    ///
    /// Afterwards every node is restarted and the whole cluster must advance
    /// [`RunnerConfig::settle_height`] past the highest height observed.
    pub async fn run_churn<N: ConsensusNode>(
        &mut self,
        cluster: &Cluster<N>,
    ) -> Result<RunReport> {
        let budget = self.prepare(cluster)?;
        let mut report = self.report();
        tracing::info!(
            cluster = %cluster.name(),
            nodes = cluster.len(),
            budget,
            duration = ?self.config.duration,
            tick = ?self.config.tick,
            "starting churn run"
        );

        let (tick, duration) = (self.config.tick, self.config.duration);
        let mut outcome = Ok(());
        execute_every(tick, duration, |_elapsed| {
            if outcome.is_ok() {
                report.ticks += 1;
                match self.churn_step(cluster, budget) {
                    Ok(Some(ChurnAction::Stop(_))) => report.stops += 1,
                    Ok(Some(ChurnAction::Start(_))) => report.starts += 1,
                    Ok(_) => {}
                    Err(e) => outcome = Err(e),
                }
                report.observe(Self::unavailable(cluster));
            }
            async {}
        })
        .await;

        self.finish(cluster, report, outcome).await
    }

    /// Run the network variant.
    ///
    /// Each phase raises the target by [`RunnerConfig::height_step`],
    /// partitions off a random minority of `1..=budget` nodes and waits for
    /// the majority to reach the target. It then stops a random number of
    /// majority nodes within the remaining budget, raises the target again
    /// and waits for the running majority. The phase ends by clearing the
    /// partition and restarting the stopped nodes.
    ///
    /// Phases repeat until the run window elapses or the target reaches
    /// [`RunnerConfig::max_height`]. A phase wait that times out aborts the
    /// run with its [`ConvergenceTimeout`](Error::ConvergenceTimeout).
    pub async fn run_network<N: ConsensusNode>(
        &mut self,
        cluster: &Cluster<N>,
    ) -> Result<RunReport> {
        let budget = self.prepare(cluster)?;
        let mut report = self.report();
        tracing::info!(
            cluster = %cluster.name(),
            nodes = cluster.len(),
            budget,
            duration = ?self.config.duration,
            max_height = ?self.config.max_height,
            "starting unreliable network run"
        );
        if budget == 0 {
            tracing::warn!(
                nodes = cluster.len(),
                "cluster too small for faults, running without partitions"
            );
        }

        let outcome = self.network_phases(cluster, budget, &mut report).await;
        self.finish(cluster, report, outcome).await
    }

    async fn network_phases<N: ConsensusNode>(
        &mut self,
        cluster: &Cluster<N>,
        budget: usize,
        report: &mut RunReport,
    ) -> Result<()> {
        let start = Instant::now();
        let step = self.config.height_step;
        let timeout = self.config.phase_timeout;
        let mut target = 0u64;

        loop {
            report.ticks += 1;
            target += step;

            if budget == 0 {
                cluster.wait_for_height(target, timeout, None).await?;
            } else {
                let mut names = cluster.node_names();
                names.shuffle(&mut self.rng);
                let size = 1 + self.rng.random_range(0..budget);
                let majority = names.split_off(size);
                let minority = names;

                tracing::info!(
                    "partition ratio {}/{}, target height {}",
                    majority.len(),
                    minority.len(),
                    target
                );
                cluster
                    .transport()
                    .partition(minority.iter().cloned(), majority.iter().cloned())?;
                report.partitions += 1;
                report.observe(Self::unavailable(cluster));
                cluster
                    .wait_for_height(target, timeout, Some(majority.as_slice()))
                    .await?;

                let drop = self.rng.random_range(0..=budget - size);
                let (dropped, running) = majority.split_at(drop);
                tracing::info!(nodes = ?dropped, "dropping {} majority nodes", drop);
                for name in dropped {
                    cluster.stop_node(name.as_str())?;
                }
                report.stops += drop as u64;
                report.observe(Self::unavailable(cluster));

                target += step;
                cluster.wait_for_height(target, timeout, Some(running)).await?;

                cluster.transport().reset();
                for name in dropped {
                    cluster.start_node(name.as_str())?;
                }
                report.starts += drop as u64;
            }

            if self.config.max_height.is_some_and(|max| target >= max) {
                tracing::info!(target, "maximum height reached");
                return Ok(());
            }
            if start.elapsed() >= self.config.duration {
                tracing::info!(elapsed = ?start.elapsed(), "run window elapsed");
                return Ok(());
            }
        }
    }

    fn prepare<N: ConsensusNode>(&self, cluster: &Cluster<N>) -> Result<usize> {
        if cluster.is_empty() {
            return Err(Error::Config(format!(
                "cluster {} has no nodes",
                cluster.name()
            )));
        }
        cluster.start()?;
        Ok(fault_budget(cluster.len()))
    }

    fn report(&self) -> RunReport {
        RunReport {
            seed: self.config.seed,
            ..RunReport::default()
        }
    }

    /// Lift every fault, then wait for the whole cluster to settle.
    async fn finish<N: ConsensusNode>(
        &self,
        cluster: &Cluster<N>,
        mut report: RunReport,
        outcome: Result<()>,
    ) -> Result<RunReport> {
        cluster.transport().reset();
        let restored = cluster.start();
        outcome?;
        restored?;

        let target = cluster.max_height() + self.config.settle_height;
        tracing::info!(target, "faults lifted, waiting for cluster to settle");
        cluster
            .wait_for_height(target, self.config.settle_timeout, None)
            .await?;
        report.final_height = cluster.heights().into_values().min().unwrap_or(0);
        tracing::info!(%report, "run complete");
        Ok(report)
    }
}

impl fmt::Debug for FuzzRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuzzRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
