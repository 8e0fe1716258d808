//! # bft-chaos
//!
//! Chaos and fuzz harness for BFT consensus clusters.
//!
//! The harness runs a set of consensus participants in one process, routes
//! every message they exchange through a fault-injecting transport, and
//! checks that consensus stays live while at most the tolerated number of
//! nodes is unavailable.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 FuzzRunner (fault scheduler)                     │
//! │      churn: stop/start nodes · network: partition + drop         │
//! └──────────────┬──────────────────────────────────┬───────────────┘
//!                │ start_node / stop_node           │ partition / reset
//! ┌──────────────▼──────────────┐   ┌───────────────▼───────────────┐
//! │          Cluster            │   │      PartitionTransport       │
//! │ wait_for_height · is_stuck  │   │  jitter · partitions · stats  │
//! ├─────────────────────────────┤   ├───────────────────────────────┤
//! │  NodeHandle ... NodeHandle  │──▶│  inner Transport  ·  Recorder │
//! └─────────────────────────────┘   └───────────────────────────────┘
//! ```
//!
//! ## Correctness oracles
//!
//! | Check | Passes when |
//! |-------|-------------|
//! | [`Cluster::wait_for_height`] | every selected node reaches the target before the timeout |
//! | [`Cluster::is_stuck`] | no selected node commits anything during the window |
//! | [`FuzzRunner`] | faults never exceed [`fault_budget`] and the cluster settles afterwards |
//!
//! ## Example
//!
//! ```ignore
//! use bft_chaos::{
//!     sim::{sim_cluster, SimConfig},
//!     ClusterConfig, DirectTransport, FuzzRunner, PartitionTransport, RunnerConfig,
//!     TransportConfig,
//! };
//! use std::{sync::Arc, time::Duration};
//!
//! let transport = Arc::new(PartitionTransport::new(
//!     DirectTransport::new(),
//!     TransportConfig::new().with_max_jitter(Duration::from_millis(500)),
//! ));
//! let cluster = sim_cluster(
//!     "churn", "ptr", 20, transport, SimConfig::new(), ClusterConfig::new(),
//! )?;
//!
//! let mut runner = FuzzRunner::new(RunnerConfig::churn().with_seed(42))?;
//! let report = runner.run_churn(&cluster).await?;
//! println!("{}", report);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

mod cluster;
mod config;
mod error;
mod node;
mod replay;
mod runner;
mod transport;

pub mod sim;
pub mod testing;

pub use cluster::Cluster;

pub use config::{ClusterConfig, RunnerConfig, TransportConfig};

pub use error::{Error, NodeHeight, Progressed, Result};

pub use node::{node_names, ConsensusNode, NodeHandle, NodeName};

pub use replay::{FlowFileRecorder, NoopRecorder, Recorder};

pub use runner::{fault_budget, ChurnAction, FuzzRunner, RunReport};

pub use transport::{
    DirectTransport, Envelope, Inbox, NoopTransport, Partition, PartitionTransport, Transport,
    TransportStats, TransportStatsSnapshot,
};
