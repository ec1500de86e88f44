//! Snapshot save/load behavior: round-trips, pending-event merging, failure modes.

mod common;

use common::{authoritative, build_coordinator, LatticeConfig, Ship};
use trailstate::{CoordinatorBuilder, EntityId, Frame, TssError};

/// A peer restored from a snapshot is observationally equivalent to the sender:
/// identical subsequent traffic produces identical digests, update after update.
#[test]
fn restored_peer_behaves_identically() {
    let mut sender = build_coordinator(&[3, 8], false);
    sender
        .push_command(authoritative(1, 1, 2, -1), Frame::new(10))
        .unwrap();
    let entity = sender.allocate_entity_id();
    sender
        .schedule_add(entity, Ship { x: 5, y: 5 }, Frame::new(12))
        .unwrap();
    sender.run_to_frame(Frame::new(15)).unwrap();

    let bytes = sender.save_snapshot().unwrap();

    let mut receiver = CoordinatorBuilder::<LatticeConfig>::new()
        .with_delays([3, 8])
        .build()
        .unwrap();
    assert!(receiver.is_waiting_for_synchronization());
    receiver.load_snapshot(&bytes).unwrap();
    assert!(!receiver.is_waiting_for_synchronization());

    assert_eq!(receiver.trailing_frame(), sender.trailing_frame());
    assert_eq!(receiver.trailing_digest(), sender.trailing_digest());

    // identical traffic from here on keeps them identical
    for step in 0..20u64 {
        let frame = Frame::new(16 + step);
        sender
            .push_command(authoritative(2, step, 1, 1), frame)
            .unwrap();
        receiver
            .push_command(authoritative(2, step, 1, 1), frame)
            .unwrap();
        sender.update().unwrap();
        receiver.update().unwrap();
        assert_eq!(sender.trailing_digest(), receiver.trailing_digest());
        assert_eq!(sender.leading_digest(), receiver.leading_digest());
    }
}

/// The id allocator rides in the snapshot: both peers assign the same id to the
/// next insertion.
#[test]
fn entity_allocation_stays_synchronized_across_snapshots() {
    let mut sender = build_coordinator(&[4], false);
    let first = sender.allocate_entity_id();
    sender
        .schedule_add(first, Ship { x: 1, y: 2 }, Frame::new(6))
        .unwrap();
    sender.run_to_frame(Frame::new(8)).unwrap();

    let bytes = sender.save_snapshot().unwrap();
    let mut receiver = CoordinatorBuilder::<LatticeConfig>::new()
        .with_delays([4])
        .build()
        .unwrap();
    receiver.load_snapshot(&bytes).unwrap();

    assert_eq!(sender.allocate_entity_id(), receiver.allocate_entity_id());
}

/// Locally scheduled future events survive a snapshot load: the snapshot's
/// pending events are merged in, they do not wipe the local timeline.
#[test]
fn local_future_events_survive_a_snapshot_load() {
    let mut sender = build_coordinator(&[6], false);
    sender.run_to_frame(Frame::new(10)).unwrap();
    let bytes = sender.save_snapshot().unwrap();

    let mut receiver = build_coordinator(&[6], false);
    receiver.run_to_frame(Frame::new(10)).unwrap();
    // the receiver heard about a confirmed command the snapshot does not carry
    receiver
        .push_command(authoritative(3, 99, 7, 7), Frame::new(30))
        .unwrap();
    receiver.invalidate();
    assert!(receiver.is_waiting_for_synchronization());

    receiver.load_snapshot(&bytes).unwrap();
    assert!(!receiver.is_waiting_for_synchronization());
    assert_eq!(receiver.pending_command_count(), 1);

    // and the merged command still executes
    let mut baseline = build_coordinator(&[6], false);
    baseline.run_to_frame(Frame::new(10)).unwrap();
    baseline
        .push_command(authoritative(3, 99, 7, 7), Frame::new(30))
        .unwrap();
    receiver.run_to_frame(Frame::new(40)).unwrap();
    baseline.run_to_frame(Frame::new(40)).unwrap();
    assert_eq!(receiver.trailing_digest(), baseline.trailing_digest());
}

/// Malformed snapshot bytes surface a codec error and leave the coordinator in
/// whatever state it was in; a waiting coordinator keeps waiting.
#[test]
fn malformed_snapshot_is_rejected() {
    common::init_tracing();
    let mut receiver = CoordinatorBuilder::<LatticeConfig>::new()
        .with_delays([4])
        .build()
        .unwrap();

    let result = receiver.load_snapshot(&[0xde, 0xad, 0xbe, 0xef]);
    assert!(matches!(result, Err(TssError::Codec { .. })));
    assert!(receiver.is_waiting_for_synchronization());
}

/// A truncated copy of a valid snapshot is also rejected.
#[test]
fn truncated_snapshot_is_rejected() {
    let mut sender = build_coordinator(&[4], false);
    sender.run_to_frame(Frame::new(10)).unwrap();
    let mut bytes = sender.save_snapshot().unwrap();
    bytes.truncate(bytes.len() - 7);

    let mut receiver = CoordinatorBuilder::<LatticeConfig>::new()
        .with_delays([4])
        .build()
        .unwrap();
    assert!(receiver.load_snapshot(&bytes).is_err());
    assert!(receiver.is_waiting_for_synchronization());
}

/// Saving before any world has been seeded has nothing to serialize.
#[test]
fn save_requires_a_seeded_coordinator() {
    common::init_tracing();
    let unseeded = CoordinatorBuilder::<LatticeConfig>::new()
        .with_delays([4])
        .build()
        .unwrap();
    assert!(matches!(unseeded.save_snapshot(), Err(TssError::NotReady)));
}

/// A snapshot taken after an invalidation is the standard recovery path: the
/// invalidated peer reloads and rejoins.
#[test]
fn snapshot_recovers_an_invalidated_peer() {
    let mut healthy = build_coordinator(&[2, 6], false);
    let mut stale = build_coordinator(&[2, 6], false);
    healthy.run_to_frame(Frame::new(20)).unwrap();
    stale.run_to_frame(Frame::new(20)).unwrap();

    // the stale peer misses its window and invalidates
    let result = stale.push_command(authoritative(1, 1, 1, 0), Frame::new(2));
    assert!(result.is_err());
    assert!(stale.is_waiting_for_synchronization());
    assert_eq!(stale.update(), Err(TssError::NotReady));

    // recovery: fetch a fresh snapshot from the healthy peer
    let bytes = healthy.save_snapshot().unwrap();
    stale.load_snapshot(&bytes).unwrap();
    assert!(!stale.is_waiting_for_synchronization());
    assert_eq!(stale.trailing_digest(), healthy.trailing_digest());

    for _ in 0..10 {
        healthy.update().unwrap();
        stale.update().unwrap();
        assert_eq!(stale.trailing_digest(), healthy.trailing_digest());
    }
}

/// Snapshots are byte-stable: the same state serializes to the same bytes.
#[test]
fn snapshot_encoding_is_deterministic() {
    let mut one = build_coordinator(&[3], false);
    let mut other = build_coordinator(&[3], false);
    one.run_to_frame(Frame::new(9)).unwrap();
    other.run_to_frame(Frame::new(9)).unwrap();
    assert_eq!(one.save_snapshot().unwrap(), other.save_snapshot().unwrap());

    // and a world that was rebuilt from those bytes re-serializes identically
    let bytes = one.save_snapshot().unwrap();
    let mut restored = CoordinatorBuilder::<LatticeConfig>::new()
        .with_delays([3])
        .build()
        .unwrap();
    restored.load_snapshot(&bytes).unwrap();
    assert_eq!(restored.save_snapshot().unwrap(), bytes);
}