//! Randomised engine behaviour and retirement order.

use hw_mock::{Behavior, JobOutcome, MockHardware};
use proptest::collection;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use status_ring::{
    CodecStatus, EngineConfig, EngineId, LayoutRevision, ObserverHandle, RingConfig, StatusRing,
};
use status_store::SystemAllocator;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use submission_driver::{PollOutcome, PollPolicy, Poller};

fn behavior() -> impl Strategy<Value = Behavior> {
    prop_oneof![
        4 => Just(Behavior::Complete),
        1 => (1u32..0xFFFF).prop_map(Behavior::Fail),
        1 => Just(Behavior::Skip),
        1 => Just(Behavior::Hang),
    ]
}

fn expected(behaviors: &[Behavior]) -> CodecStatus {
    if behaviors.contains(&Behavior::Hang) {
        CodecStatus::Incomplete
    } else if behaviors.iter().any(|b| matches!(b, Behavior::Fail(_))) {
        CodecStatus::Error
    } else {
        CodecStatus::Successful
    }
}

fn ring(capacity: u32) -> StatusRing<()> {
    let config = RingConfig::new("props", capacity)
        .with_engine(EngineConfig::new(0, "vd0", LayoutRevision::Extended))
        .with_engine(EngineConfig::new(1, "vd1", LayoutRevision::Compact));
    StatusRing::create(&config, &mut SystemAllocator::new()).expect("ring")
}

proptest! {
    /// Whatever order jobs retire in, every unit resolves to the reduction of
    /// its engines' behaviour and each success is announced exactly once.
    #[test]
    fn any_retirement_order_reduces_correctly(
        jobs in collection::vec(collection::vec(behavior(), 2), 1..8),
        seed in any::<u64>(),
    ) {
        let mut ring = ring(8);
        let mut hw = MockHardware::for_ring(&ring);
        let announced = Rc::new(RefCell::new(HashMap::<u64, u32>::new()));
        {
            let announced = Rc::clone(&announced);
            ring.register_observer("count", ObserverHandle::callback(move |snapshot| {
                *announced.borrow_mut().entry(snapshot.sequence).or_insert(0) += 1;
                Ok(())
            }));
        }

        for (n, behaviors) in jobs.iter().enumerate() {
            let ticket = ring.begin_submission(n as u32, None).expect("begin");
            let overrides = [(EngineId(0), behaviors[0]), (EngineId(1), behaviors[1])];
            hw.kick_with(ticket.sequence, &overrides);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        while hw.run_random(&mut ring, &mut rng).is_some() {
            for sequence in 0..jobs.len() as u64 {
                let status = ring.query(sequence).codec_status;
                prop_assert_ne!(status, CodecStatus::Unavailable);
            }
        }

        for (sequence, behaviors) in jobs.iter().enumerate() {
            let sequence = sequence as u64;
            let status = ring.query(sequence).codec_status;
            prop_assert_eq!(status, expected(behaviors));
            let count = announced.borrow().get(&sequence).copied().unwrap_or(0);
            let want = u32::from(status == CodecStatus::Successful);
            prop_assert_eq!(count, want);
        }
        prop_assert!(ring.outstanding() <= u64::from(ring.capacity()));
    }

    /// A bounded poller always terminates, even when engines hang.
    #[test]
    fn bounded_polling_never_hangs(
        behaviors in collection::vec(behavior(), 2),
        max_queries in 1u32..10,
    ) {
        let mut ring = ring(2);
        let mut hw = MockHardware::for_ring(&ring);
        let ticket = ring.begin_submission(0, None).expect("begin");
        hw.kick_with(
            ticket.sequence,
            &[(EngineId(0), behaviors[0]), (EngineId(1), behaviors[1])],
        );

        let mut poller = Poller::new(PollPolicy { max_queries });
        let mut rounds = 0u32;
        let outcome = poller.wait(&mut ring, ticket.sequence, |ring| {
            rounds += 1;
            hw.run_next(ring);
        });
        prop_assert!(rounds < max_queries);

        match outcome {
            PollOutcome::Ready(snapshot) => {
                prop_assert_eq!(snapshot.codec_status, expected(&behaviors));
            }
            PollOutcome::TimedOut(snapshot) => {
                prop_assert_eq!(snapshot.codec_status, CodecStatus::Incomplete);
                let hung = behaviors.contains(&Behavior::Hang);
                // With one query allowed the unit times out before hardware runs.
                prop_assert!(hung || max_queries == 1);
            }
            other => prop_assert!(false, "unexpected outcome {:?}", other),
        }
        prop_assert_eq!(ring.outstanding(), 0);
    }
}

#[test]
fn hung_job_is_reported_by_the_model() {
    let mut ring = ring(2);
    let mut hw = MockHardware::for_ring(&ring);
    hw.set_behavior(EngineId(1), Behavior::Hang);
    let ticket = ring.begin_submission(0, None).expect("begin");
    hw.kick(ticket.sequence);
    assert_eq!(hw.run_next(&mut ring), Some(JobOutcome::Hung(0)));
    assert_eq!(ring.query(0).codec_status, CodecStatus::Incomplete);
}
