//! Ring reuse across many generations of submissions.

use hw_mock::{Behavior, MockHardware};
use status_ring::{CodecStatus, EngineConfig, EngineId, LayoutRevision, RingConfig, RingError, StatusRing};
use status_store::SystemAllocator;

fn ring(capacity: u32) -> StatusRing<()> {
    let config = RingConfig::new("wrap", capacity)
        .with_engine(EngineConfig::new(0, "vd0", LayoutRevision::Compact))
        .with_engine(EngineConfig::new(1, "vd1", LayoutRevision::Compact));
    StatusRing::create(&config, &mut SystemAllocator::new()).expect("ring")
}

#[test]
fn fifth_submission_evicts_the_first() {
    let mut ring = ring(4);
    let mut hw = MockHardware::for_ring(&ring);
    for n in 0..5 {
        let ticket = ring.begin_submission(n, None).expect("begin");
        hw.kick(ticket.sequence);
    }
    hw.run_all(&mut ring);

    assert_eq!(ring.index_of(4), 0);
    assert_eq!(ring.query(0).codec_status, CodecStatus::Unavailable);
    for sequence in 1..5 {
        assert_eq!(ring.query(sequence).codec_status, CodecStatus::Successful);
    }
    // The evicted submission was never reported, so it counts as reported on eviction.
    assert_eq!(ring.reported_count(), 5);
    assert_eq!(ring.outstanding(), 0);
}

#[test]
fn late_hardware_write_for_evicted_submission_is_ignored() {
    let mut ring = ring(2);
    let mut hw = MockHardware::for_ring(&ring);
    let first = ring.begin_submission(0, None).expect("begin");
    hw.kick_with(first.sequence, &[(EngineId(0), Behavior::Fail(1))]);
    ring.begin_submission(1, None).expect("begin");
    let third = ring.begin_submission(2, None).expect("begin");
    assert_eq!(third.index, first.index);

    // Hardware finally executes the job for the evicted submission.
    hw.run_next(&mut ring);
    assert_eq!(ring.query(first.sequence).codec_status, CodecStatus::Unavailable);
    // Its fence value names sequence 0, so the new occupant stays gated.
    assert_eq!(ring.query(third.sequence).codec_status, CodecStatus::Incomplete);

    // Resubmitting clears the stale error before the real job runs.
    ring.resubmit(third.sequence).expect("resubmit");
    hw.kick(third.sequence);
    hw.run_all(&mut ring);
    assert_eq!(ring.query(third.sequence).codec_status, CodecStatus::Successful);
}

#[test]
fn outstanding_never_exceeds_capacity_when_nobody_queries() {
    let mut ring = ring(3);
    for n in 0..20 {
        ring.begin_submission(n, None).expect("begin");
        assert!(ring.outstanding() <= 3);
    }
    assert_eq!(ring.submitted_count(), 20);
    assert_eq!(ring.outstanding(), 3);
}

#[test]
fn evicted_sequence_cannot_be_resubmitted() {
    let mut ring = ring(2);
    for n in 0..3 {
        ring.begin_submission(n, None).expect("begin");
    }
    assert!(matches!(
        ring.resubmit(0),
        Err(RingError::StaleSlot { sequence: 0 })
    ));
    assert!(matches!(
        ring.resubmit(3),
        Err(RingError::StaleSlot { sequence: 3 })
    ));
    assert!(ring.resubmit(2).is_ok());
}
