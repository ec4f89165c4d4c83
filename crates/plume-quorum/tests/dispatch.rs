//! End-to-end dispatch scenarios against in-memory collaborators.

use assert_matches::assert_matches;
use futures::future::join_all;
use plume_quorum::{
    AddCallback, EntryId, ErrorCode, LedgerError, Operation, ReadCallback,
};
use plume_testkit::TestCluster;
use std::sync::Arc;
use tokio::sync::oneshot;

fn add_callback() -> (AddCallback, oneshot::Receiver<(ErrorCode, EntryId)>) {
    let (tx, rx) = oneshot::channel();
    let callback: AddCallback = Box::new(move |code, _ledger, entry| {
        let _ = tx.send((code, entry));
    });
    (callback, rx)
}

type ReadOutcome = (ErrorCode, Vec<Option<plume_quorum::LedgerEntry>>);

fn read_callback() -> (ReadCallback, oneshot::Receiver<ReadOutcome>) {
    let (tx, rx) = oneshot::channel();
    let callback: ReadCallback = Box::new(move |code, _ledger, results| {
        let _ = tx.send((code, results));
    });
    (callback, rx)
}

#[tokio::test]
async fn add_targets_quorum_indices_for_entry_five() {
    let cluster = TestCluster::with_first_entry(3, 2, EntryId(5));
    let (callback, delivered) = add_callback();

    let op = cluster
        .engine
        .submit(Operation::add(
            Arc::clone(&cluster.ledger),
            b"payload".to_vec(),
            callback,
        ))
        .await
        .expect("dispatch should succeed");

    // (5+0) % 3 = 2 and (5+1) % 3 = 0.
    assert_eq!(cluster.bookies[2].add_sends().len(), 1);
    assert_eq!(cluster.bookies[2].add_sends()[0].entry, EntryId(5));
    assert_eq!(cluster.bookies[0].add_sends().len(), 1);
    assert!(cluster.bookies[1].add_sends().is_empty());

    // Issued is not acknowledged.
    assert!(!op.completion().is_ready());

    cluster.ack_all_writes();
    assert_eq!(op.completion().wait().await, ErrorCode::Ok);

    let (code, entry) = delivered.await.expect("callback delivered");
    assert_eq!(code, ErrorCode::Ok);
    assert_eq!(entry, EntryId(5));
}

#[tokio::test]
async fn add_fails_synchronously_without_quorum() {
    let cluster = TestCluster::new(1, 2);
    let (callback, _delivered) = add_callback();

    let err = cluster
        .engine
        .submit(Operation::add(
            Arc::clone(&cluster.ledger),
            b"x".to_vec(),
            callback,
        ))
        .await
        .expect_err("1 bookie cannot satisfy quorum 2");

    assert_matches!(err, LedgerError::NotEnoughBookies { have: 1, need: 2 });
    assert_eq!(cluster.bookies[0].attempts(), 0);
    assert!(cluster.monitor.registered_ops().is_empty());
    assert!(cluster.worker.registered_ops().is_empty());
}

#[tokio::test]
async fn ready_transitions_only_after_quorum_acks() {
    let cluster = TestCluster::new(3, 2);
    let (callback, _delivered) = add_callback();

    // Entry 0 targets indices 0 and 1.
    let op = cluster
        .engine
        .submit(Operation::add(
            Arc::clone(&cluster.ledger),
            b"v".to_vec(),
            callback,
        ))
        .await
        .expect("dispatch should succeed");

    cluster.bookies[0].ack_writes();
    assert!(!op.completion().is_ready());

    cluster.bookies[1].ack_writes();
    assert!(op.completion().is_ready());
    assert_eq!(op.completion().error_code(), ErrorCode::Ok);
}

#[tokio::test]
async fn operations_are_registered_before_dispatch() {
    let cluster = TestCluster::new(3, 2);
    let (callback, _delivered) = add_callback();

    let op = cluster
        .engine
        .submit(Operation::add(
            Arc::clone(&cluster.ledger),
            b"v".to_vec(),
            callback,
        ))
        .await
        .expect("dispatch should succeed");

    assert_eq!(cluster.monitor.registered_ops(), vec![op.id()]);
    assert_eq!(cluster.worker.registered_ops(), vec![op.id()]);
}

#[tokio::test]
async fn read_single_entry_targets_enabled_replicas() {
    let cluster = TestCluster::new(3, 2);
    for bookie in &cluster.bookies {
        bookie.seed_entry(EntryId(10), b"ten".to_vec());
    }
    let (callback, delivered) = read_callback();

    let read = Operation::read(
        Arc::clone(&cluster.ledger),
        EntryId(10),
        EntryId(10),
        callback,
    )
    .expect("valid range");
    let op = cluster
        .engine
        .submit(read)
        .await
        .expect("dispatch should succeed");

    // (10+0) % 3 = 1 and (10+1) % 3 = 2.
    assert_eq!(cluster.bookies[1].read_sends().len(), 1);
    assert_eq!(cluster.bookies[2].read_sends().len(), 1);
    assert!(cluster.bookies[0].read_sends().is_empty());

    cluster.serve_all_reads();
    assert_eq!(op.completion().wait().await, ErrorCode::Ok);

    let (code, results) = delivered.await.expect("callback delivered");
    assert_eq!(code, ErrorCode::Ok);
    assert_eq!(results.len(), 1);
    let entry = results[0].as_ref().expect("slot filled");
    assert_eq!(entry.entry, EntryId(10));
    assert_eq!(entry.payload, b"ten");
}

#[tokio::test]
async fn read_range_preallocates_one_slot_per_entry() {
    let cluster = TestCluster::new(3, 2);
    for raw in 3..=6 {
        for bookie in &cluster.bookies {
            bookie.seed_entry(EntryId(raw), format!("v{raw}").into_bytes());
        }
    }
    let (callback, delivered) = read_callback();

    let read = Operation::read(
        Arc::clone(&cluster.ledger),
        EntryId(3),
        EntryId(6),
        callback,
    )
    .expect("valid range");
    cluster
        .engine
        .submit(read)
        .await
        .expect("dispatch should succeed");

    // Two sends per entry across the ensemble.
    let total_reads: usize = cluster
        .bookies
        .iter()
        .map(|b| b.read_sends().len())
        .sum();
    assert_eq!(total_reads, 8);

    cluster.serve_all_reads();
    let (code, results) = delivered.await.expect("callback delivered");
    assert_eq!(code, ErrorCode::Ok);
    assert_eq!(results.len(), 4);
    for (offset, slot) in results.iter().enumerate() {
        let entry = slot.as_ref().expect("every slot filled");
        assert_eq!(entry.entry, EntryId(3 + offset as u64));
        assert_eq!(entry.payload, format!("v{}", 3 + offset).into_bytes());
    }
}

#[tokio::test]
async fn read_replaces_disabled_replica() {
    let cluster = TestCluster::new(3, 2);
    cluster.bookies[1].set_enabled(false);
    for bookie in &cluster.bookies {
        bookie.seed_entry(EntryId(10), b"ten".to_vec());
    }
    let (callback, delivered) = read_callback();

    let read = Operation::read(
        Arc::clone(&cluster.ledger),
        EntryId(10),
        EntryId(10),
        callback,
    )
    .expect("valid range");
    cluster
        .engine
        .submit(read)
        .await
        .expect("dispatch should succeed");

    // Primary index 1 is disabled; the ring walk covers quorum with 2
    // and 0 instead of silently under-covering.
    assert!(cluster.bookies[1].read_sends().is_empty());
    assert_eq!(cluster.bookies[2].read_sends().len(), 1);
    assert_eq!(cluster.bookies[0].read_sends().len(), 1);

    cluster.serve_all_reads();
    let (code, results) = delivered.await.expect("callback delivered");
    assert_eq!(code, ErrorCode::Ok);
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn add_retries_bounded_then_uses_replacement() {
    let cluster = TestCluster::with_first_entry(3, 2, EntryId(5));
    // Slot 0's primary is index 2; exhaust all three attempts there.
    cluster.bookies[2].fail_next_sends(3);
    let (callback, _delivered) = add_callback();

    cluster
        .engine
        .submit(Operation::add(
            Arc::clone(&cluster.ledger),
            b"v".to_vec(),
            callback,
        ))
        .await
        .expect("dispatch should succeed");

    // Bounded retry: exactly max_attempts against the primary, no spin.
    assert_eq!(cluster.bookies[2].attempts(), 3);
    assert!(cluster.bookies[2].add_sends().is_empty());
    // Replacement comes from outside the quorum window: ring slot 2 is
    // index (5+2) % 3 = 1.
    assert_eq!(cluster.bookies[1].add_sends().len(), 1);
    // Slot 1 still goes to its own primary, index 0.
    assert_eq!(cluster.bookies[0].add_sends().len(), 1);
}

#[tokio::test]
async fn nacked_writes_become_quorum_unreachable() {
    let cluster = TestCluster::new(3, 2);
    let (callback, delivered) = add_callback();

    // Entry 0 targets indices 0 and 1.
    let op = cluster
        .engine
        .submit(Operation::add(
            Arc::clone(&cluster.ledger),
            b"v".to_vec(),
            callback,
        ))
        .await
        .expect("dispatch should succeed");

    // One nack still leaves two replicas standing; quorum is possible.
    cluster.bookies[0].nack_writes();
    assert!(!op.completion().is_ready());
    // The second nack exceeds n - q = 1: fewer than q replicas remain.
    cluster.nack_all_writes();

    assert_eq!(op.completion().wait().await, ErrorCode::QuorumUnreachable);
    let (code, _entry) = delivered.await.expect("callback delivered");
    assert_eq!(code, ErrorCode::QuorumUnreachable);
}

#[tokio::test]
async fn replacement_never_reuses_a_quorum_replica() {
    let cluster = TestCluster::new(2, 2);
    // Slot 0's primary is index 0; exhaust every attempt there.
    cluster.bookies[0].fail_next_sends(10);
    let (callback, delivered) = add_callback();

    let op = cluster
        .engine
        .submit(Operation::add(
            Arc::clone(&cluster.ledger),
            b"v".to_vec(),
            callback,
        ))
        .await
        .expect("dispatch should succeed");

    // With n == q there is no replica outside the quorum window: slot 0
    // must fail rather than double up on slot 1's primary.
    assert_eq!(cluster.bookies[0].attempts(), 3);
    assert!(cluster.bookies[0].add_sends().is_empty());
    assert_eq!(cluster.bookies[1].add_sends().len(), 1);
    assert_eq!(cluster.bookies[1].pending_write_count(), 1);

    assert_eq!(op.completion().wait().await, ErrorCode::QuorumUnreachable);
    // A lone ack from the surviving replica is not a quorum.
    cluster.bookies[1].ack_writes();
    assert_eq!(op.completion().error_code(), ErrorCode::QuorumUnreachable);
    let (code, _entry) = delivered.await.expect("callback delivered");
    assert_eq!(code, ErrorCode::QuorumUnreachable);
}

#[tokio::test]
async fn add_routes_around_disabled_replica() {
    let cluster = TestCluster::new(3, 2);
    cluster.bookies[0].set_enabled(false);
    let (callback, delivered) = add_callback();

    let op = cluster
        .engine
        .submit(Operation::add(
            Arc::clone(&cluster.ledger),
            b"v".to_vec(),
            callback,
        ))
        .await
        .expect("dispatch should succeed");

    // Slot 0's primary refuses every send; the replacement is index 2,
    // the only replica outside the quorum window.
    assert_eq!(cluster.bookies[0].attempts(), 3);
    assert!(cluster.bookies[0].add_sends().is_empty());
    assert_eq!(cluster.bookies[1].add_sends().len(), 1);
    assert_eq!(cluster.bookies[2].add_sends().len(), 1);

    cluster.ack_all_writes();
    assert_eq!(op.completion().wait().await, ErrorCode::Ok);
    let (code, _entry) = delivered.await.expect("callback delivered");
    assert_eq!(code, ErrorCode::Ok);
}

#[tokio::test]
async fn uncovered_read_fails_instead_of_hanging() {
    let cluster = TestCluster::new(3, 2);
    for bookie in &cluster.bookies {
        bookie.set_enabled(false);
    }
    let (callback, delivered) = read_callback();

    let read = Operation::read(
        Arc::clone(&cluster.ledger),
        EntryId(0),
        EntryId(0),
        callback,
    )
    .expect("valid range");
    let op = cluster
        .engine
        .submit(read)
        .await
        .expect("dispatch should succeed");

    // Both slots are uncovered; their nacks exceed n - q = 1 and the
    // read terminates instead of waiting for responses that cannot come.
    assert_eq!(op.completion().wait().await, ErrorCode::ReadMissingEntry);
    let (code, results) = delivered.await.expect("callback delivered");
    assert_eq!(code, ErrorCode::ReadMissingEntry);
    assert_eq!(results.len(), 1);
    assert!(results[0].is_none());
}

#[tokio::test]
async fn unreadable_entry_fails_the_read() {
    let cluster = TestCluster::new(2, 2);
    let (callback, delivered) = read_callback();

    // Nothing seeded: both replicas miss.
    let read = Operation::read(
        Arc::clone(&cluster.ledger),
        EntryId(5),
        EntryId(5),
        callback,
    )
    .expect("valid range");
    cluster
        .engine
        .submit(read)
        .await
        .expect("dispatch should succeed");

    cluster.serve_all_reads();
    let (code, results) = delivered.await.expect("callback delivered");
    assert_eq!(code, ErrorCode::ReadMissingEntry);
    assert_eq!(results.len(), 1);
    assert!(results[0].is_none());
}

#[tokio::test]
async fn write_then_read_back_round_trips() {
    let cluster = TestCluster::new(3, 2);
    let (add_cb, add_delivered) = add_callback();

    let op = cluster
        .engine
        .submit(Operation::add(
            Arc::clone(&cluster.ledger),
            b"durable".to_vec(),
            add_cb,
        ))
        .await
        .expect("add dispatch");
    cluster.ack_all_writes();
    op.completion()
        .wait()
        .await
        .ok_or_err()
        .expect("write should be durable");
    let (code, entry) = add_delivered.await.expect("add delivered");
    assert_eq!(code, ErrorCode::Ok);

    let (read_cb, read_delivered) = read_callback();
    let read = Operation::read(Arc::clone(&cluster.ledger), entry, entry, read_cb)
        .expect("valid range");
    cluster.engine.submit(read).await.expect("read dispatch");
    cluster.serve_all_reads();

    let (code, results) = read_delivered.await.expect("read delivered");
    assert_eq!(code, ErrorCode::Ok);
    let got = results[0].as_ref().expect("slot filled");
    assert_eq!(got.payload, b"durable");
}

#[tokio::test]
async fn stop_rejects_later_submissions() {
    let cluster = TestCluster::new(3, 2);
    let (callback, delivered) = add_callback();

    cluster
        .engine
        .submit(Operation::add(
            Arc::clone(&cluster.ledger),
            b"v".to_vec(),
            callback,
        ))
        .await
        .expect("add dispatch");
    cluster.ack_all_writes();
    // Completion enqueued before the stop is still delivered.
    let (code, _entry) = delivered.await.expect("drained before stop");
    assert_eq!(code, ErrorCode::Ok);

    let stop = cluster
        .engine
        .submit(Operation::stop(Arc::clone(&cluster.ledger)))
        .await
        .expect("stop accepted");
    assert!(stop.completion().is_ready());
    assert_eq!(stop.completion().error_code(), ErrorCode::Ok);
    assert!(cluster.engine.is_stopped());

    let (callback, _delivered) = add_callback();
    let err = cluster
        .engine
        .submit(Operation::add(
            Arc::clone(&cluster.ledger),
            b"late".to_vec(),
            callback,
        ))
        .await
        .expect_err("engine is stopped");
    assert_matches!(err, LedgerError::EngineStopped);
    assert_eq!(cluster.worker.delivered_count(), 1);
}

#[tokio::test]
async fn concurrent_adds_get_unique_consecutive_entries() {
    let cluster = TestCluster::new(3, 2);
    let ledger = Arc::clone(&cluster.ledger);
    let engine = Arc::new(cluster.engine);

    let submissions = (0..20).map(|_| {
        let engine = Arc::clone(&engine);
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            let (callback, _delivered) = add_callback();
            let op = engine
                .submit(Operation::add(ledger, b"c".to_vec(), callback))
                .await
                .expect("dispatch should succeed");
            op.as_add().expect("add kind").entry()
        })
    });

    let mut entries: Vec<EntryId> = join_all(submissions)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();
    entries.sort();
    entries.dedup();
    assert_eq!(entries.len(), 20);
    assert_eq!(entries[0], EntryId(0));
    assert_eq!(entries[19], EntryId(19));
}
