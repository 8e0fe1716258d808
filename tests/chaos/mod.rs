//! Chaos test suite for BFT clusters.
//!
//! Every scenario runs on tokio's paused clock, so the timings below are
//! virtual and a multi-minute scenario completes in well under a second of
//! wall time.

mod harness;
mod network_churn;
mod node_drop;
mod partition;
mod replay;
mod unreliable_network;
