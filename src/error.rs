//! Error types for the chaos harness.

use std::fmt;
use std::time::Duration;

use crate::node::NodeName;
use crate::transport::Partition;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Height of a single node at the moment a check gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHeight {
    /// Node name.
    pub name: NodeName,
    /// Last observed committed height.
    pub height: u64,
    /// Whether the node was running when observed.
    pub running: bool,
}

impl fmt::Display for NodeHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.running {
            write!(f, "{}@{}", self.name, self.height)
        } else {
            write!(f, "{}@{} (stopped)", self.name, self.height)
        }
    }
}

/// A node that advanced while it was expected to be stuck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progressed {
    /// Node name.
    pub name: NodeName,
    /// Height at the start of the observation window.
    pub before: u64,
    /// Height at the end of the observation window.
    pub after: u64,
}

/// Errors that can occur while driving a cluster.
#[derive(Debug)]
pub enum Error {
    /// A node name was not part of the cluster.
    NotFound(NodeName),

    /// Two participants were registered under the same name.
    DuplicateNode(NodeName),

    /// A participant could not be started. It is left stopped.
    NodeStart {
        /// Node that failed to start.
        node: NodeName,
        /// Why it failed.
        reason: String,
    },

    /// Partition groups were not disjoint.
    InvalidPartition {
        /// Node present in both groups.
        node: NodeName,
    },

    /// The target height was not reached before the deadline.
    ConvergenceTimeout {
        /// Height every observed node had to reach.
        target: u64,
        /// How long the check waited.
        elapsed: Duration,
        /// Nodes still below the target when the check gave up.
        lagging: Vec<NodeHeight>,
        /// Partition active when the check gave up.
        partition: Option<Partition>,
        /// Nodes stopped when the check gave up.
        stopped: Vec<NodeName>,
    },

    /// Nodes expected to make no progress advanced during the window.
    StuckAssertion {
        /// Length of the observation window.
        window: Duration,
        /// Nodes whose height changed.
        progressed: Vec<Progressed>,
    },

    /// The replay recorder failed to flush or close.
    RecorderClose(std::io::Error),

    /// Configuration error.
    Config(String),

    /// Generic IO error.
    Io(std::io::Error),
}

impl Error {
    /// Returns `true` for failures of a correctness oracle.
    ///
    /// These are the failures a run reports as FAIL, as opposed to setup
    /// or persistence errors.
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Error::ConvergenceTimeout { .. } | Error::StuckAssertion { .. }
        )
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(name) => {
                write!(f, "node not found: {}", name)
            }
            Error::DuplicateNode(name) => {
                write!(f, "duplicate node name: {}", name)
            }
            Error::NodeStart { node, reason } => {
                write!(f, "failed to start node {}: {}", node, reason)
            }
            Error::InvalidPartition { node } => {
                write!(f, "node {} appears in both partition groups", node)
            }
            Error::ConvergenceTimeout {
                target,
                elapsed,
                lagging,
                partition,
                stopped,
            } => {
                write!(
                    f,
                    "height {} not reached after {:?}; lagging: [{}]",
                    target,
                    elapsed,
                    join(lagging)
                )?;
                if let Some(partition) = partition {
                    write!(f, "; partition: {}", partition)?;
                }
                if !stopped.is_empty() {
                    write!(f, "; stopped: [{}]", join(stopped))?;
                }
                Ok(())
            }
            Error::StuckAssertion { window, progressed } => {
                let detail = progressed
                    .iter()
                    .map(|p| format!("{} {}->{}", p.name, p.before, p.after))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "expected stuck nodes progressed within {:?}: [{}]",
                    window, detail
                )
            }
            Error::RecorderClose(err) => {
                write!(f, "failed to close replay recorder: {}", err)
            }
            Error::Config(msg) => {
                write!(f, "configuration error: {}", msg)
            }
            Error::Io(err) => {
                write!(f, "IO error: {}", err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) | Error::RecorderClose(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_timeout_display() {
        let err = Error::ConvergenceTimeout {
            target: 15,
            elapsed: Duration::from_secs(60),
            lagging: vec![
                NodeHeight {
                    name: NodeName::from("ptr_1"),
                    height: 9,
                    running: true,
                },
                NodeHeight {
                    name: NodeName::from("ptr_2"),
                    height: 4,
                    running: false,
                },
            ],
            partition: None,
            stopped: vec![NodeName::from("ptr_2")],
        };
        let text = err.to_string();
        assert!(text.contains("height 15"));
        assert!(text.contains("ptr_1@9"));
        assert!(text.contains("ptr_2@4 (stopped)"));
        assert!(text.contains("stopped: [ptr_2]"));
        assert!(err.is_assertion());
    }

    #[test]
    fn test_stuck_assertion_display() {
        let err = Error::StuckAssertion {
            window: Duration::from_secs(30),
            progressed: vec![Progressed {
                name: NodeName::from("ptr_3"),
                before: 4,
                after: 7,
            }],
        };
        assert!(err.to_string().contains("ptr_3 4->7"));
        assert!(err.is_assertion());
    }

    #[test]
    fn test_node_start_display() {
        let err = Error::NodeStart {
            node: NodeName::from("ptr_0"),
            reason: "no runtime".to_string(),
        };
        assert_eq!(err.to_string(), "failed to start node ptr_0: no runtime");
        assert!(!err.is_assertion());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "test error");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_assertion());
    }
}
