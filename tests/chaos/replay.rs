//! Replay recording of a live cluster.

use std::sync::Arc;

use bft_chaos::sim::SimMessage;
use bft_chaos::{Envelope, FlowFileRecorder, Recorder};

use super::harness::{ClusterBuilder, WAIT};

#[tokio::test(start_paused = true)]
async fn test_flow_file_captures_partitioned_traffic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replay.flow");
    let recorder = Arc::new(FlowFileRecorder::create(&path).unwrap());

    let cluster = ClusterBuilder::new("replay", "rec", 4)
        .recorder(recorder.clone())
        .build();
    cluster.start().unwrap();
    cluster.wait_for_height(3, WAIT, None).await.unwrap();

    // Dropped messages are recorded too.
    let names = cluster.node_names();
    cluster
        .transport()
        .partition(names[..1].to_vec(), names[1..].to_vec())
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    cluster.stop();
    let stats = cluster.transport().stats();
    assert!(stats.messages_partitioned > 0);

    Recorder::<SimMessage>::close(&*recorder).unwrap();
    // A second close is harmless.
    Recorder::<SimMessage>::close(&*recorder).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let recorded: Vec<Envelope<SimMessage>> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(recorded.len() as u64, stats.messages_total);
    assert!(recorded
        .iter()
        .all(|e| e.from.as_str().starts_with("rec_") && e.from != e.to));
}
