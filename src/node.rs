//! Node handles wrapping consensus participants.
//!
//! A [`NodeHandle`] owns one participant and is the only place the harness
//! changes its lifecycle. It keeps its own running flag and a snapshot of the
//! last committed height so observers never touch the participant while it
//! is being stopped or started.

use std::{
    borrow::Borrow,
    fmt::{self, Debug},
    ops::Range,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Name of a node in a cluster, e.g. `ptr_0`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    /// Create a node name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for NodeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for NodeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Generate `prefix{i}` names for every `i` in `range`.
///
/// `node_names("ptr_", 1..5)` yields `ptr_1` through `ptr_4`.
pub fn node_names(prefix: &str, range: Range<usize>) -> Vec<NodeName> {
    range.map(|i| NodeName(format!("{}{}", prefix, i))).collect()
}

/// A consensus participant the harness can drive.
///
/// Implementations send and receive through a
/// [`Transport`](crate::transport::Transport) so message delivery can be
/// intercepted, and must stop committing once [`stop`](Self::stop) returns.
pub trait ConsensusNode: Send + Sync + 'static {
    /// Message type exchanged between participants.
    type Message: Clone + Debug + Send + Sync + 'static;

    /// Name of this participant.
    fn name(&self) -> &NodeName;

    /// Attach to the transport and begin processing.
    ///
    /// On error the participant must be left stopped.
    fn start(&self) -> Result<()>;

    /// Detach from the transport and stop processing.
    fn stop(&self);

    /// Whether the participant is processing.
    fn is_running(&self) -> bool;

    /// Last committed height.
    fn height(&self) -> u64;
}

/// Lifecycle wrapper around one participant.
///
/// `start` and `stop` are idempotent. `height` and `is_running` are lock-free
/// and safe to call while another task changes the lifecycle.
pub struct NodeHandle<N> {
    node: Arc<N>,
    running: AtomicBool,
    /// Highest height observed; frozen while stopped.
    last_height: AtomicU64,
    /// Serializes start/stop transitions.
    transition: Mutex<()>,
}

impl<N: ConsensusNode> NodeHandle<N> {
    /// Wrap a participant, adopting its current running state.
    pub fn new(node: N) -> Self {
        let height = node.height();
        let running = node.is_running();
        Self {
            node: Arc::new(node),
            running: AtomicBool::new(running),
            last_height: AtomicU64::new(height),
            transition: Mutex::new(()),
        }
    }

    /// Node name.
    pub fn name(&self) -> &NodeName {
        self.node.name()
    }

    /// The wrapped participant.
    pub fn node(&self) -> &Arc<N> {
        &self.node
    }

    /// Start the participant. No-op if already running.
    ///
    /// If the participant fails to start the handle stays stopped.
    pub fn start(&self) -> Result<()> {
        let _guard = self.transition.lock();
        if self.running.load(Ordering::Acquire) {
            tracing::trace!(node = %self.name(), "start ignored, already running");
            return Ok(());
        }
        if let Err(e) = self.node.start() {
            tracing::warn!(node = %self.name(), "node failed to start: {}", e);
            return Err(e);
        }
        self.running.store(true, Ordering::Release);
        tracing::debug!(
            node = %self.name(),
            height = self.last_height.load(Ordering::Acquire),
            "node started"
        );
        Ok(())
    }

    /// Stop the participant. No-op if already stopped.
    pub fn stop(&self) {
        let _guard = self.transition.lock();
        if !self.running.load(Ordering::Acquire) {
            tracing::trace!(node = %self.name(), "stop ignored, already stopped");
            return;
        }
        self.node.stop();
        // Freeze before the flag flips so a stopped handle never reports
        // a value older than the participant's final commit.
        let final_height = self.node.height();
        let frozen = self
            .last_height
            .fetch_max(final_height, Ordering::AcqRel)
            .max(final_height);
        self.running.store(false, Ordering::Release);
        tracing::debug!(node = %self.name(), height = frozen, "node stopped");
    }

    /// Whether the participant is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Last observed committed height.
    ///
    /// Non-decreasing while running, constant while stopped.
    pub fn height(&self) -> u64 {
        if self.running.load(Ordering::Acquire) {
            let current = self.node.height();
            self.last_height
                .fetch_max(current, Ordering::AcqRel)
                .max(current)
        } else {
            self.last_height.load(Ordering::Acquire)
        }
    }
}

impl<N: ConsensusNode> Debug for NodeHandle<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("name", self.name())
            .field("running", &self.is_running())
            .field("height", &self.last_height.load(Ordering::Relaxed))
            .finish()
    }
}
