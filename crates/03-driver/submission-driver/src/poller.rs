//! Bounded polling of submissions.
//!
//! The ring never blocks and never times out on its own. The poller keeps a
//! per-submission count of Incomplete answers and abandons a submission via
//! `force_status(sequence, false)` once the [`PollPolicy`] budget is spent, so
//! a hung engine cannot stall the caller forever.

use crate::policy::PollPolicy;
use log::warn;
use status_ring::{CodecStatus, StatusRing, StatusSnapshot};
use std::collections::HashMap;

/// Result of one poll.
#[derive(Debug)]
pub enum PollOutcome<R> {
    /// Terminal status reached (Successful or Error).
    Ready(StatusSnapshot<R>),
    /// Still Incomplete; `queries_left` more polls before giving up.
    Pending { queries_left: u32 },
    /// Budget spent; the slot was abandoned as Incomplete.
    TimedOut(StatusSnapshot<R>),
    /// Submission is not held by the ring.
    Unavailable(StatusSnapshot<R>),
}

impl<R> PollOutcome<R> {
    pub fn is_pending(&self) -> bool {
        matches!(self, PollOutcome::Pending { .. })
    }

    /// Final snapshot, if the outcome carries one.
    pub fn snapshot(&self) -> Option<&StatusSnapshot<R>> {
        match self {
            PollOutcome::Ready(s) | PollOutcome::TimedOut(s) | PollOutcome::Unavailable(s) => {
                Some(s)
            }
            PollOutcome::Pending { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Poller {
    policy: PollPolicy,
    spent: HashMap<u64, u32>,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            spent: HashMap::new(),
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Submissions with a partially spent budget.
    pub fn tracked(&self) -> usize {
        self.spent.len()
    }

    /// Queries `sequence` once, charging its budget on Incomplete.
    ///
    /// A slot that was already abandoned times out immediately. At most
    /// `capacity` budgets are tracked: entries for submissions the ring no
    /// longer holds are dropped before a new one is opened.
    pub fn poll<R>(&mut self, ring: &mut StatusRing<R>, sequence: u64) -> PollOutcome<R> {
        if ring.is_abandoned(sequence) {
            self.spent.remove(&sequence);
            return PollOutcome::TimedOut(ring.query(sequence));
        }

        let snapshot = ring.query(sequence);
        match snapshot.codec_status {
            CodecStatus::Successful | CodecStatus::Error => {
                self.spent.remove(&sequence);
                PollOutcome::Ready(snapshot)
            }
            CodecStatus::Unavailable => {
                self.spent.remove(&sequence);
                PollOutcome::Unavailable(snapshot)
            }
            CodecStatus::Incomplete => {
                if self.spent.len() >= ring.capacity() as usize {
                    self.forget_stale(ring);
                }
                let spent = self.spent.entry(sequence).or_insert(0);
                *spent += 1;
                if *spent < self.policy.max_queries {
                    return PollOutcome::Pending {
                        queries_left: self.policy.max_queries - *spent,
                    };
                }
                self.spent.remove(&sequence);
                warn!(
                    "ring `{}`: submission {sequence} incomplete after {} queries",
                    ring.name(),
                    self.policy.max_queries
                );
                PollOutcome::TimedOut(ring.force_status(sequence, false))
            }
        }
    }

    /// Polls until the outcome is no longer pending, running `between` after
    /// every Incomplete answer (typically to let hardware make progress).
    pub fn wait<R>(
        &mut self,
        ring: &mut StatusRing<R>,
        sequence: u64,
        mut between: impl FnMut(&mut StatusRing<R>),
    ) -> PollOutcome<R> {
        loop {
            match self.poll(ring, sequence) {
                PollOutcome::Pending { .. } => between(ring),
                outcome => return outcome,
            }
        }
    }

    /// Drops budgets of submissions the ring no longer holds.
    pub fn forget_stale<R>(&mut self, ring: &StatusRing<R>) {
        self.spent
            .retain(|sequence, _| ring.live_index(*sequence).is_some());
    }
}
