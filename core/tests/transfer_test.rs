use simnet_core::file::chunk_bytes;
use simnet_core::{
    NetworkConnection, NetworkNode, NodeStatus, SimError, SimEvent, SimFile, Simulation,
    Topology, TransferOptions, TransferPhase, TransferRequest, ValidationError,
};
use std::time::Duration;

const KB: usize = 1024;

fn abc() -> Topology {
    let mut topology = Topology::new();
    topology.add_node(NetworkNode::new("A", "Node A")).unwrap();
    topology.add_node(NetworkNode::new("B", "Node B")).unwrap();
    topology.add_node(NetworkNode::new("C", "Node C")).unwrap();
    topology
        .add_connection(
            NetworkConnection::new("ab", "Link 1", "A", "B")
                .with_latency(10.0)
                .with_bandwidth(100.0),
        )
        .unwrap();
    topology
        .add_connection(
            NetworkConnection::new("bc", "Link 2", "B", "C")
                .with_latency(20.0)
                .with_bandwidth(50.0),
        )
        .unwrap();
    topology
}

fn payload(len: usize) -> SimFile {
    SimFile::new("video.mp4", (0..len).map(|i| (i * 7 % 256) as u8).collect())
}

async fn all_online(sim: &Simulation) -> bool {
    sim.nodes()
        .await
        .iter()
        .all(|n| n.status == NodeStatus::Online)
}

#[tokio::test]
async fn test_three_chunks_over_two_hops() {
    let sim = Simulation::new(abc());
    let file = payload(600 * KB);
    let expected_chunks = chunk_bytes(&file.data, 256 * KB).unwrap();
    assert_eq!(
        expected_chunks.iter().map(|c| c.size()).collect::<Vec<_>>(),
        vec![256 * 1024, 256 * 1024, 88 * 1024]
    );

    let request = TransferRequest::new(file, "A", "C").with_chunk_size(256 * KB);
    let report = sim
        .start_transfer(request, TransferOptions::instant())
        .await
        .unwrap();

    assert_eq!(report.path, vec!["A", "B", "C"]);
    assert_eq!(report.chunks, 3);
    assert_eq!(report.blocks_appended, 6);
    assert_eq!(report.skipped_hops, 0);

    let ledger = sim.ledger().await;
    assert_eq!(ledger.len(), 6);

    let expected = [
        (0, "Node A", "Node B"),
        (0, "Node B", "Node C"),
        (1, "Node A", "Node B"),
        (1, "Node B", "Node C"),
        (2, "Node A", "Node B"),
        (2, "Node B", "Node C"),
    ];
    for (i, (block, (chunk_id, from, to))) in ledger.blocks().iter().zip(expected).enumerate() {
        assert_eq!(block.block_number, i as u64);
        assert_eq!(block.chunk_id, chunk_id);
        assert_eq!(block.from, from);
        assert_eq!(block.to, to);
        assert_eq!(block.file_name, "video.mp4");
        assert_eq!(block.hash, expected_chunks[chunk_id as usize].hash.to_hex());
    }

    // Lossless links make every hop time exact.
    assert!((ledger.blocks()[0].transfer_time - 30.0).abs() < 1e-9);
    assert!((ledger.blocks()[1].transfer_time - 60.0).abs() < 1e-9);

    assert!(all_online(&sim).await);
    assert_eq!(sim.phase().await, TransferPhase::Completed);
}

#[tokio::test]
async fn test_block_numbers_continue_across_transfers() {
    let sim = Simulation::new(abc());

    for _ in 0..2 {
        let request = TransferRequest::new(payload(10 * KB), "C", "A").with_chunk_size(4 * KB);
        sim.start_transfer(request, TransferOptions::instant())
            .await
            .unwrap();
    }

    let ledger = sim.ledger().await;
    assert_eq!(ledger.len(), 12);
    for (i, block) in ledger.blocks().iter().enumerate() {
        assert_eq!(block.block_number, i as u64);
    }
    assert_eq!(ledger.blocks()[0].from, "Node C");
}

#[tokio::test]
async fn test_validation_failure_stays_idle() {
    let sim = Simulation::new(abc());
    let mut rx = sim.subscribe();

    let mut request = TransferRequest::new(payload(KB), "A", "C");
    request.file = None;
    let err = sim
        .start_transfer(request, TransferOptions::instant())
        .await
        .unwrap_err();
    assert!(matches!(err, SimError::Validation(ValidationError::NoFile)));

    let same = TransferRequest::new(payload(KB), "A", "A");
    assert!(matches!(
        sim.start_transfer(same, TransferOptions::instant()).await,
        Err(SimError::Validation(ValidationError::SameEndpoints(_)))
    ));

    let zero = TransferRequest::new(payload(KB), "A", "C").with_chunk_size(0);
    assert!(matches!(
        sim.start_transfer(zero, TransferOptions::instant()).await,
        Err(SimError::Validation(ValidationError::ZeroChunkSize))
    ));

    assert_eq!(sim.phase().await, TransferPhase::Idle);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unreachable_destination_appends_nothing() {
    let mut topology = abc();
    topology.add_node(NetworkNode::new("D", "Node D")).unwrap();
    let sim = Simulation::new(topology);

    let request = TransferRequest::new(payload(KB), "A", "D");
    let err = sim
        .start_transfer(request, TransferOptions::instant())
        .await
        .unwrap_err();
    assert!(matches!(err, SimError::NoRoute { .. }));
    assert!(sim.ledger().await.is_empty());
    assert_eq!(sim.phase().await, TransferPhase::Failed);

    // Recoverable: the next valid transfer runs normally.
    let request = TransferRequest::new(payload(KB), "A", "B");
    sim.start_transfer(request, TransferOptions::instant())
        .await
        .unwrap();
    assert_eq!(sim.ledger().await.len(), 1);
}

#[tokio::test]
async fn test_empty_file_completes_without_blocks() {
    let sim = Simulation::new(abc());
    let report = sim
        .start_transfer(
            TransferRequest::new(SimFile::new("empty", Vec::new()), "A", "C"),
            TransferOptions::instant(),
        )
        .await
        .unwrap();
    assert_eq!(report.chunks, 0);
    assert!(sim.ledger().await.is_empty());
    assert_eq!(sim.phase().await, TransferPhase::Completed);
}

#[tokio::test]
async fn test_failure_keeps_appended_blocks() {
    // Edited in place, skipping add_connection's checks.
    let mut topology = abc();
    topology.connections[1].packet_loss = 1.5;
    let sim = Simulation::new(topology);

    let request = TransferRequest::new(payload(KB), "A", "C");
    let err = sim
        .start_transfer(request, TransferOptions::instant())
        .await
        .unwrap_err();

    assert!(matches!(err, SimError::InvalidLink { ref id, .. } if id == "bc"));
    assert_eq!(sim.ledger().await.len(), 1);
    assert_eq!(sim.phase().await, TransferPhase::Failed);
    assert!(all_online(&sim).await);
}

#[tokio::test]
async fn test_seeded_runs_are_reproducible() {
    let mut lossy = abc();
    lossy.connections[0].packet_loss = 0.5;
    lossy.connections[1].packet_loss = 0.5;

    let mut times = Vec::new();
    for _ in 0..2 {
        let sim = Simulation::new(lossy.clone());
        let request = TransferRequest::new(payload(64 * KB), "A", "C").with_chunk_size(4 * KB);
        sim.start_transfer(request, TransferOptions::instant().with_seed(99))
            .await
            .unwrap();
        times.push(
            sim.ledger()
                .await
                .blocks()
                .iter()
                .map(|b| b.transfer_time)
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(times[0], times[1]);
    assert_eq!(times[0].len(), 32);
}

#[tokio::test(start_paused = true)]
async fn test_second_transfer_rejected_while_active() {
    let sim = Simulation::new(abc());
    let mut rx = sim.subscribe();

    let runner = sim.clone();
    let first = tokio::spawn(async move {
        runner
            .start_transfer(
                TransferRequest::new(payload(KB), "A", "C"),
                TransferOptions::default(),
            )
            .await
    });

    // Wait until the first hop is in flight.
    loop {
        if let SimEvent::HopStarted { .. } = rx.recv().await.unwrap() {
            break;
        }
    }

    assert_eq!(sim.phase().await, TransferPhase::Transferring);
    let nodes = sim.nodes().await;
    assert_eq!(nodes[0].status, NodeStatus::Transferring);
    assert_eq!(nodes[1].status, NodeStatus::Transferring);
    assert_eq!(nodes[2].status, NodeStatus::Online);

    let second = sim
        .start_transfer(
            TransferRequest::new(payload(KB), "B", "C"),
            TransferOptions::instant(),
        )
        .await;
    assert!(matches!(second, Err(SimError::TransferInProgress)));

    // Snapshot loads are refused too.
    let snapshot = sim.save_snapshot().await;
    assert!(matches!(
        sim.load_snapshot(snapshot).await,
        Err(SimError::TransferInProgress)
    ));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.blocks_appended, 2);
    assert!(all_online(&sim).await);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_keeps_recorded_blocks() {
    let sim = Simulation::new(abc());

    let runner = sim.clone();
    let transfer = tokio::spawn(async move {
        runner
            .start_transfer(
                TransferRequest::new(payload(8 * KB), "A", "C").with_chunk_size(4 * KB),
                TransferOptions::default(),
            )
            .await
    });

    while sim.ledger().await.is_empty() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    sim.cancel();

    let result = transfer.await.unwrap();
    assert!(matches!(result, Err(SimError::Cancelled)));
    assert_eq!(sim.ledger().await.len(), 1);
    assert_eq!(sim.phase().await, TransferPhase::Failed);
    assert!(all_online(&sim).await);
}

#[tokio::test]
async fn test_deleting_node_keeps_history() {
    let sim = Simulation::new(abc());
    sim.start_transfer(
        TransferRequest::new(payload(KB), "A", "C"),
        TransferOptions::instant(),
    )
    .await
    .unwrap();
    let before = sim.ledger().await;

    sim.remove_node("B").await.unwrap();

    assert!(sim.connections().await.is_empty());
    assert_eq!(sim.ledger().await, before);

    // The route is gone now.
    let err = sim
        .start_transfer(
            TransferRequest::new(payload(KB), "A", "C"),
            TransferOptions::instant(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SimError::NoRoute { .. }));
}

#[tokio::test]
async fn test_snapshot_after_transfer_round_trips() {
    let sim = Simulation::new(abc());
    sim.start_transfer(
        TransferRequest::new(payload(300 * KB), "A", "C"),
        TransferOptions::instant().with_seed(5),
    )
    .await
    .unwrap();
    sim.select_node(Some("B".to_string())).await;

    let json = sim.save_snapshot().await.to_json().unwrap();

    let restored = Simulation::default();
    restored.load_snapshot_json(&json).await.unwrap();

    assert_eq!(restored.nodes().await, sim.nodes().await);
    assert_eq!(restored.connections().await, sim.connections().await);
    assert_eq!(restored.ledger().await, sim.ledger().await);
    assert_eq!(restored.selection().await.node, None);

    // Numbering resumes after the restored history.
    restored
        .start_transfer(
            TransferRequest::new(payload(KB), "A", "B"),
            TransferOptions::instant(),
        )
        .await
        .unwrap();
    let ledger = restored.ledger().await;
    assert_eq!(ledger.last().unwrap().block_number, 4);
}
