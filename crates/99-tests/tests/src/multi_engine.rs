//! Multi-engine sessions driven through the hardware model.

use hw_mock::{Behavior, MockHardware};
use parking_lot::Mutex;
use status_ring::{
    CodecStatus, EngineCompletion, EngineId, NotifyError, ObserverHandle, RingConfig, StatusRing,
};
use status_store::{RegionLedger, SystemAllocator};
use std::sync::Arc;
use submission_driver::channel_observer;

const TRANSCODE_CONFIG: &str = r#"{
    "name": "transcode",
    "capacity": 8,
    "engines": [
        { "id": 0, "name": "decode", "layout": "extended" },
        { "id": 1, "name": "encode", "layout": "compact" },
        { "id": 2, "name": "scaler", "enabled": false }
    ]
}"#;

fn transcode_ring(ledger: &mut Option<RegionLedger>) -> StatusRing<u32> {
    let _ = env_logger::builder().is_test(true).try_init();
    let config: RingConfig = serde_json::from_str(TRANSCODE_CONFIG).expect("config");
    let mut allocator = SystemAllocator::new();
    *ledger = Some(allocator.ledger());
    StatusRing::create(&config, &mut allocator).expect("ring")
}

#[test]
fn disabled_engine_gets_no_region() {
    let mut ledger = None;
    let ring = transcode_ring(&mut ledger);
    let ledger = ledger.expect("ledger");

    assert_eq!(ring.engines().collect::<Vec<_>>(), vec![EngineId(0), EngineId(1)]);
    // Fence plus one region per enabled engine.
    assert_eq!(ledger.live_regions(), 3);
    drop(ring);
    assert_eq!(ledger.live_regions(), 0);
    assert_eq!(ledger.live_bytes(), 0);
}

#[test]
fn skipped_engine_still_completes_the_unit() {
    let mut ledger = None;
    let mut ring = transcode_ring(&mut ledger);
    let mut hw = MockHardware::for_ring(&ring);
    let frame = Arc::new(7u32);

    let ticket = ring.begin_submission(0, Some(&frame)).expect("begin");
    hw.kick_with(ticket.sequence, &[(EngineId(1), Behavior::Skip)]);
    hw.run_all(&mut ring);

    let snapshot = ring.query(ticket.sequence);
    assert_eq!(snapshot.codec_status, CodecStatus::Successful);
    assert_eq!(snapshot.skipped_engines().collect::<Vec<_>>(), vec![EngineId(1)]);
    assert_eq!(snapshot.engines[0].completion, EngineCompletion::Ran);
    assert_eq!(snapshot.engines[0].work_count, Some(1));
    assert_eq!(snapshot.engines[1].work_count, None, "compact layout has no counter");
    assert_eq!(snapshot.resource().as_deref(), Some(&7));
}

#[test]
fn out_of_order_retirement_notifies_in_completion_order() {
    let mut ledger = None;
    let mut ring = transcode_ring(&mut ledger);
    let mut hw = MockHardware::for_ring(&ring);
    let (handle, rx) = channel_observer(8);
    ring.register_observer("display", handle);

    let tickets: Vec<_> = (0..4)
        .map(|n| {
            let ticket = ring.begin_submission(n, None).expect("begin");
            hw.kick(ticket.sequence);
            ticket
        })
        .collect();

    for sequence in [2, 0, 3, 1] {
        hw.run_sequence(&mut ring, sequence).expect("queued");
        for ticket in &tickets {
            ring.query(ticket.sequence);
        }
    }

    let order: Vec<u64> = rx.try_iter().map(|snapshot| snapshot.sequence).collect();
    assert_eq!(order, vec![2, 0, 3, 1]);
    assert_eq!(ring.reported_count(), 4);
}

#[test]
fn failing_observer_does_not_roll_back_success() {
    let mut ledger = None;
    let mut ring = transcode_ring(&mut ledger);
    let mut hw = MockHardware::for_ring(&ring);
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        ring.register_observer(
            "picky",
            ObserverHandle::callback(move |snapshot| {
                seen.lock().push(snapshot.sequence);
                Err(NotifyError::rejected("no room"))
            }),
        );
    }

    let ticket = ring.begin_submission(0, None).expect("begin");
    hw.kick(ticket.sequence);
    hw.run_all(&mut ring);

    for _ in 0..3 {
        assert_eq!(ring.query(ticket.sequence).codec_status, CodecStatus::Successful);
    }
    assert_eq!(*seen.lock(), vec![0]);
    assert_eq!(ring.notify_failures(), 1);
}

#[test]
fn resubmit_clears_partial_hardware_writes() {
    let mut ledger = None;
    let mut ring = transcode_ring(&mut ledger);
    let mut hw = MockHardware::for_ring(&ring);

    // First attempt: decode faults, encode never finishes, the batch does not retire.
    let ticket = ring.begin_submission(0, None).expect("begin");
    hw.kick_with(
        ticket.sequence,
        &[
            (EngineId(0), Behavior::Fail(0x10)),
            (EngineId(1), Behavior::Hang),
        ],
    );
    hw.run_all(&mut ring);
    assert_eq!(ring.query(ticket.sequence).codec_status, CodecStatus::Incomplete);

    ring.resubmit(ticket.sequence).expect("resubmit");
    hw.kick(ticket.sequence);
    hw.run_all(&mut ring);

    let snapshot = ring.query(ticket.sequence);
    assert_eq!(snapshot.codec_status, CodecStatus::Successful);
    assert!(snapshot.engines.iter().all(|engine| engine.error_bits == 0));
    assert_eq!(hw.hung(), 1);
}
