//! Repeated minority/majority partitions with node drops under jitter.

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

use bft_chaos::{fault_budget, FuzzRunner, RunnerConfig};

use super::harness::{ClusterBuilder, WAIT};

#[tokio::test(start_paused = true)]
async fn test_unreliable_network() {
    let seed = 2024;
    let mut rng = StdRng::seed_from_u64(seed);
    let nodes = 20 + rng.random_range(0..=10);
    let budget = fault_budget(nodes);

    let cluster = ClusterBuilder::new("network_unreliable", "prt", nodes)
        .jitter(Duration::from_millis(50))
        .seed(seed)
        .build();
    let config = RunnerConfig::unreliable_network()
        .with_seed(seed)
        .with_max_height(100)
        .with_phase_timeout(WAIT)
        .with_settle(20, Duration::from_secs(120));
    let mut runner = FuzzRunner::with_rng(config, rng).unwrap();

    let report = runner.run_network(&cluster).await.unwrap();

    // Two height steps of 10 per phase up to 100.
    assert_eq!(report.ticks, 5);
    assert_eq!(report.partitions, 5);
    assert_eq!(report.stops, report.starts);
    assert!(report.max_unavailable >= 1);
    assert!(report.max_unavailable <= budget);
    assert!(report.final_height >= 120);

    assert!(cluster.transport().current_partition().is_none());
    assert!(cluster.stopped_nodes().is_empty());
    cluster.stop();
}

/// Decisions depend only on the seed.
#[tokio::test(start_paused = true)]
async fn test_unreliable_network_same_seed_same_decisions() {
    let run = |seed| async move {
        let cluster = ClusterBuilder::new("network_seeded", "prt", 12)
            .seed(seed)
            .build();
        let config = RunnerConfig::unreliable_network()
            .with_seed(seed)
            .with_max_height(40)
            .with_phase_timeout(WAIT)
            .with_settle(5, WAIT);
        let report = FuzzRunner::new(config)
            .unwrap()
            .run_network(&cluster)
            .await
            .unwrap();
        cluster.stop();
        (report.partitions, report.stops, report.max_unavailable)
    };

    assert_eq!(run(77).await, run(77).await);
}
