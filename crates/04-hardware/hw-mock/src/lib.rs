//! Deterministic model of hardware engines writing status records.
//!
//! Each kicked submission becomes a job. Running a job writes every engine's
//! record according to its [`Behavior`] and then retires the batch by storing
//! the fence word, exactly as a command stream ending in store-data commands
//! would. Jobs can run in submission order, by sequence, or shuffled.

use log::trace;
use rand::Rng;
use smallvec::SmallVec;
use status_ring::{EngineId, StatusField, StatusRing, MARKER_DONE};
use std::collections::{BTreeMap, VecDeque};

/// What an engine does with its part of a job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Behavior {
    /// Writes diagnostics and the done marker.
    #[default]
    Complete,
    /// Writes the done marker with `code` in the error register mirror.
    Fail(u32),
    /// Never touches the record; the host's skip sentinel stays in place.
    Skip,
    /// Never finishes: the batch does not retire.
    Hang,
}

#[derive(Clone, Debug)]
struct Job {
    sequence: u64,
    behaviors: SmallVec<[(EngineId, Behavior); 4]>,
}

/// Outcome of running one job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Retired(u64),
    Hung(u64),
}

pub struct MockHardware {
    defaults: BTreeMap<EngineId, Behavior>,
    queue: VecDeque<Job>,
    retired: u64,
    hung: u64,
}

impl MockHardware {
    pub fn new(engines: impl IntoIterator<Item = EngineId>) -> Self {
        Self {
            defaults: engines
                .into_iter()
                .map(|engine| (engine, Behavior::Complete))
                .collect(),
            queue: VecDeque::new(),
            retired: 0,
            hung: 0,
        }
    }

    /// Mirrors the engine set of `ring`.
    pub fn for_ring<R>(ring: &StatusRing<R>) -> Self {
        Self::new(ring.engines())
    }

    /// Behaviour applied to jobs kicked from now on.
    pub fn set_behavior(&mut self, engine: EngineId, behavior: Behavior) {
        self.defaults.insert(engine, behavior);
    }

    /// Queues `sequence` with the current default behaviours.
    pub fn kick(&mut self, sequence: u64) {
        self.kick_with(sequence, &[]);
    }

    /// Queues `sequence`, overriding the behaviour of some engines.
    pub fn kick_with(&mut self, sequence: u64, overrides: &[(EngineId, Behavior)]) {
        let behaviors = self
            .defaults
            .iter()
            .map(|(engine, default)| {
                let behavior = overrides
                    .iter()
                    .find(|(id, _)| id == engine)
                    .map_or(*default, |(_, behavior)| *behavior);
                (*engine, behavior)
            })
            .collect();
        trace!("hw: kick {sequence}");
        self.queue.push_back(Job {
            sequence,
            behaviors,
        });
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn retired(&self) -> u64 {
        self.retired
    }

    pub fn hung(&self) -> u64 {
        self.hung
    }

    /// Runs the oldest queued job.
    pub fn run_next<R>(&mut self, ring: &mut StatusRing<R>) -> Option<JobOutcome> {
        let job = self.queue.pop_front()?;
        self.execute(ring, job)
    }

    /// Runs the queued job for `sequence`, skipping ahead of older jobs.
    pub fn run_sequence<R>(&mut self, ring: &mut StatusRing<R>, sequence: u64) -> Option<JobOutcome> {
        let position = self.queue.iter().position(|job| job.sequence == sequence)?;
        let job = self.queue.remove(position)?;
        self.execute(ring, job)
    }

    /// Runs every queued job in submission order.
    pub fn run_all<R>(&mut self, ring: &mut StatusRing<R>) -> Vec<JobOutcome> {
        let mut outcomes = Vec::with_capacity(self.queue.len());
        while let Some(outcome) = self.run_next(ring) {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Runs one randomly chosen queued job.
    pub fn run_random<R>(
        &mut self,
        ring: &mut StatusRing<R>,
        rng: &mut impl Rng,
    ) -> Option<JobOutcome> {
        if self.queue.is_empty() {
            return None;
        }
        let position = rng.gen_range(0..self.queue.len());
        let job = self.queue.remove(position)?;
        self.execute(ring, job)
    }

    fn execute<R>(&mut self, ring: &mut StatusRing<R>, job: Job) -> Option<JobOutcome> {
        let mut hw = ring.hardware_view()?;
        let sequence = job.sequence;
        let mut hangs = false;

        for (lane, (engine, behavior)) in job.behaviors.iter().enumerate() {
            let (engine, behavior) = (*engine, *behavior);
            let error = match behavior {
                Behavior::Complete => 0,
                Behavior::Fail(code) => code,
                Behavior::Skip => continue,
                Behavior::Hang => {
                    hangs = true;
                    continue;
                }
            };
            hw.write_field(
                engine,
                sequence,
                StatusField::LaneEngineId(lane as u8),
                u32::from(engine.0) + 1,
            );
            hw.write_field(engine, sequence, StatusField::Checksum, checksum(sequence, engine));
            hw.write_field(engine, sequence, StatusField::WorkCount, 1);
            hw.write_field(engine, sequence, StatusField::ErrorStatus, error);
            hw.write_field(engine, sequence, StatusField::CompletionMarker, MARKER_DONE);
        }

        if hangs {
            trace!("hw: job {sequence} hung");
            self.hung += 1;
            return Some(JobOutcome::Hung(sequence));
        }

        hw.retire(sequence);
        self.retired += 1;
        trace!("hw: job {sequence} retired");
        Some(JobOutcome::Retired(sequence))
    }
}

/// Stand-in for the frame checksum an engine reports.
pub fn checksum(sequence: u64, engine: EngineId) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for byte in sequence
        .to_le_bytes()
        .into_iter()
        .chain(std::iter::once(engine.0))
    {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
