//! Random stop/start churn within the fault budget.

use std::time::Duration;

use bft_chaos::testing::execute_every;
use bft_chaos::{fault_budget, FuzzRunner, RunnerConfig};

use super::harness::{ClusterBuilder, WAIT};

/// Churn 20 nodes, then check the stopped ones are frozen, the running ones
/// progress, and the whole cluster recovers once everything restarts.
#[tokio::test(start_paused = true)]
async fn test_network_churn() {
    let cluster = ClusterBuilder::new("network_churn", "ptr", 20)
        .jitter(Duration::from_millis(20))
        .seed(11)
        .build();
    let budget = fault_budget(cluster.len());
    cluster.start().unwrap();

    // One decision every 3s for 30s.
    let config = RunnerConfig::churn().with_seed(11);
    let (tick, duration) = (config.tick, config.duration);
    assert_eq!(tick, Duration::from_secs(3));
    assert_eq!(duration, Duration::from_secs(30));
    let mut runner = FuzzRunner::new(config).unwrap();
    execute_every(tick, duration, |_elapsed| {
        runner.churn_step(&cluster, budget).unwrap();
        assert!(FuzzRunner::unavailable(&cluster) <= budget);
        async {}
    })
    .await;

    let stopped = cluster.stopped_nodes();
    let running = cluster.running_nodes();
    assert!(stopped.len() <= budget);

    cluster
        .is_stuck(Duration::from_secs(30), &stopped)
        .await
        .unwrap();
    cluster
        .wait_for_height(15, WAIT, Some(&running[..]))
        .await
        .unwrap();

    cluster.start().unwrap();
    cluster.wait_for_height(20, WAIT, None).await.unwrap();
    cluster.stop();
}

/// The full churn run stays within budget and settles.
#[tokio::test(start_paused = true)]
async fn test_run_churn_report() {
    let cluster = ClusterBuilder::new("churn_run", "ptr", 20)
        .jitter(Duration::from_millis(20))
        .seed(5)
        .build();
    let config = RunnerConfig::churn()
        .with_seed(5)
        .with_tick(Duration::from_millis(300))
        .with_duration(Duration::from_millis(6100))
        .with_settle(5, WAIT);
    let mut runner = FuzzRunner::new(config).unwrap();

    let report = runner.run_churn(&cluster).await.unwrap();

    assert_eq!(report.seed, 5);
    assert_eq!(report.ticks, 20);
    assert!(report.stops > 0);
    assert!(report.max_unavailable <= fault_budget(cluster.len()));
    assert!(report.final_height >= 5);
    assert_eq!(cluster.running_nodes().len(), 20);
    cluster.stop();
}
