//! Partition correctness of the fault-injecting transport.

use std::time::Duration;

use async_channel::Receiver;
use bft_chaos::{
    node_names, DirectTransport, Envelope, NodeName, PartitionTransport, Transport,
    TransportConfig,
};

fn attach_all(
    transport: &PartitionTransport<u64>,
    names: &[NodeName],
) -> Vec<Receiver<Envelope<u64>>> {
    names
        .iter()
        .map(|name| {
            let (tx, rx) = async_channel::unbounded();
            transport.attach(name, tx);
            rx
        })
        .collect()
}

fn broadcast(transport: &PartitionTransport<u64>, names: &[NodeName], payload: u64) {
    for from in names {
        for to in names.iter().filter(|to| *to != from) {
            transport.send(Envelope::new(from.clone(), to.clone(), payload));
        }
    }
}

fn drain(inbox: &Receiver<Envelope<u64>>) -> Vec<Envelope<u64>> {
    std::iter::from_fn(|| inbox.try_recv().ok()).collect()
}

/// No message crosses the split until it is reset.
#[test]
fn test_no_cross_group_delivery() {
    let transport = PartitionTransport::new(DirectTransport::new(), TransportConfig::new());
    let names = node_names("prt_", 0..6);
    let inboxes = attach_all(&transport, &names);
    transport
        .partition(names[..2].to_vec(), names[2..].to_vec())
        .unwrap();

    broadcast(&transport, &names, 1);
    for (name, inbox) in names.iter().zip(&inboxes) {
        let in_minority = names[..2].contains(name);
        for envelope in drain(inbox) {
            assert_eq!(names[..2].contains(&envelope.from), in_minority);
        }
    }
    let stats = transport.stats();
    // 2*4 + 4*2 cross-group messages out of 30.
    assert_eq!(stats.messages_total, 30);
    assert_eq!(stats.messages_partitioned, 16);
    assert_eq!(stats.messages_delivered, 14);

    transport.reset();
    broadcast(&transport, &names, 2);
    for inbox in &inboxes {
        assert_eq!(drain(inbox).len(), 5);
    }
}

/// A partition installed while messages are delayed still suppresses them.
#[tokio::test(start_paused = true)]
async fn test_partition_applies_at_delivery_time() {
    let transport = PartitionTransport::new(
        DirectTransport::new(),
        TransportConfig::new()
            .with_max_jitter(Duration::from_millis(500))
            .with_seed(9),
    );
    let names = node_names("prt_", 0..4);
    let inboxes = attach_all(&transport, &names);

    broadcast(&transport, &names, 1);
    transport
        .partition(names[..1].to_vec(), names[1..].to_vec())
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    for (i, inbox) in inboxes.iter().enumerate() {
        for envelope in drain(inbox) {
            assert_eq!(envelope.from == names[0], i == 0, "{:?}", envelope);
        }
    }
    let stats = transport.stats();
    assert_eq!(stats.in_flight(), 0);
    assert!(stats.messages_partitioned > 0);
}

/// Nodes outside both groups stay reachable by everyone.
#[test]
fn test_unlisted_node_is_reachable() {
    let transport = PartitionTransport::new(DirectTransport::new(), TransportConfig::new());
    let names = node_names("prt_", 0..3);
    let inboxes = attach_all(&transport, &names);
    transport
        .partition(names[..1].to_vec(), names[1..2].to_vec())
        .unwrap();

    broadcast(&transport, &names, 7);
    // prt_2 hears from both sides, and both sides hear from prt_2.
    assert_eq!(drain(&inboxes[2]).len(), 2);
    assert_eq!(drain(&inboxes[0]).len(), 1);
    assert_eq!(drain(&inboxes[1]).len(), 1);
}

#[test]
fn test_overlapping_groups_rejected() {
    let transport = PartitionTransport::<u64>::new(DirectTransport::new(), TransportConfig::new());
    let names = node_names("prt_", 0..3);
    let err = transport
        .partition(names[..2].to_vec(), names[1..].to_vec())
        .unwrap_err();
    assert!(matches!(err, bft_chaos::Error::InvalidPartition { node } if node == names[1]));
    assert!(transport.current_partition().is_none());
}
