//! A single node drops out of a small cluster.

use std::time::Duration;

use bft_chaos::{fault_budget, node_names};

use super::harness::{ClusterBuilder, WAIT};

/// Four of five nodes keep committing after one stops.
#[tokio::test(start_paused = true)]
async fn test_node_drop() {
    let cluster = ClusterBuilder::new("node_drop", "ptr", 5)
        .jitter(Duration::from_millis(20))
        .build();
    cluster.start().unwrap();

    cluster.wait_for_height(2, WAIT, None).await.unwrap();

    cluster.stop_node("ptr_0").unwrap();
    let frozen = cluster.node("ptr_0").unwrap().height();

    let survivors = node_names("ptr_", 1..5);
    cluster
        .wait_for_height(15, WAIT, Some(&survivors[..]))
        .await
        .unwrap();

    // The dropped node neither progressed nor blocked the others.
    assert_eq!(cluster.node("ptr_0").unwrap().height(), frozen);
    assert!(cluster.max_height() >= 15);
    cluster.stop();
}

/// Waiting on the stopped node reports it as lagging.
#[tokio::test(start_paused = true)]
async fn test_node_drop_reports_stopped_node() {
    let cluster = ClusterBuilder::new("node_drop", "ptr", 5).build();
    cluster.start().unwrap();
    cluster.wait_for_height(2, WAIT, None).await.unwrap();
    cluster.stop_node("ptr_0").unwrap();

    let target = cluster.max_height() + 10;
    let err = cluster
        .wait_for_height(target, Duration::from_secs(5), None)
        .await
        .unwrap_err();
    match err {
        bft_chaos::Error::ConvergenceTimeout {
            lagging, stopped, ..
        } => {
            assert_eq!(lagging.len(), 1);
            assert_eq!(lagging[0].name.as_str(), "ptr_0");
            assert!(!lagging[0].running);
            assert_eq!(stopped, node_names("ptr_", 0..1));
        }
        other => panic!("unexpected error: {}", other),
    }
    cluster.stop();
}

/// Stopping more nodes than a BFT cluster tolerates halts it.
#[tokio::test(start_paused = true)]
async fn test_losing_quorum_halts_cluster() {
    let cluster = ClusterBuilder::new("quorum_loss", "ptr", 4).build();
    assert_eq!(fault_budget(cluster.len()), 0);
    cluster.start().unwrap();
    cluster.wait_for_height(3, WAIT, None).await.unwrap();

    cluster.stop_node("ptr_0").unwrap();
    cluster.stop_node("ptr_1").unwrap();
    // Drain votes already in flight.
    tokio::time::sleep(Duration::from_millis(500)).await;

    cluster
        .is_stuck(Duration::from_secs(5), &cluster.node_names())
        .await
        .unwrap();
    cluster.stop();
}
