//! One decode/encode session: a status ring plus the submit/retry/poll glue
//! around it.

use crate::error::{DriverError, DriverResult};
use crate::poller::{PollOutcome, Poller};
use crate::policy::{PollPolicy, RetryPolicy};
use log::{debug, warn};
use smallvec::SmallVec;
use status_ring::{
    ObserverHandle, ObserverId, RecordLocation, RingConfig, SlotTicket, StatusRing,
    StatusSnapshot,
};
use status_store::RegionAllocator;
use std::sync::Arc;
use thiserror::Error;

/// Everything the packet layer needs to program one unit of work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KickRequest {
    pub ticket: SlotTicket,
    pub report_number: u32,
    /// Record per enabled engine, in engine order.
    pub records: SmallVec<[RecordLocation; 4]>,
    pub fence: RecordLocation,
    /// Zero for the first kick, incremented on every resubmit.
    pub attempt: u32,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KickError {
    /// Transient failure; the unit may be resubmitted.
    #[error("recoverable: {0}")]
    Recoverable(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Seam to whatever pushes command buffers to hardware.
pub trait CommandQueue {
    fn kick(&mut self, request: &KickRequest) -> Result<(), KickError>;
}

impl<F> CommandQueue for F
where
    F: FnMut(&KickRequest) -> Result<(), KickError>,
{
    fn kick(&mut self, request: &KickRequest) -> Result<(), KickError> {
        self(request)
    }
}

pub struct Session<R> {
    ring: StatusRing<R>,
    retry: RetryPolicy,
    poller: Poller,
}

impl<R> Session<R> {
    pub fn new(
        config: &RingConfig,
        allocator: &mut dyn RegionAllocator,
        retry: RetryPolicy,
        poll: PollPolicy,
    ) -> DriverResult<Self> {
        Ok(Self {
            ring: StatusRing::create(config, allocator)?,
            retry,
            poller: Poller::new(poll),
        })
    }

    pub fn ring(&self) -> &StatusRing<R> {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut StatusRing<R> {
        &mut self.ring
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn register_observer(
        &mut self,
        name: impl Into<String>,
        handle: ObserverHandle<R>,
    ) -> ObserverId {
        self.ring.register_observer(name, handle)
    }

    /// Begins a unit of work and kicks it.
    ///
    /// Recoverable kick failures are retried through `resubmit` up to the
    /// retry budget. When the unit cannot be kicked, its slot is abandoned so
    /// later queries answer Incomplete instead of waiting on hardware that
    /// never received the work.
    pub fn submit(
        &mut self,
        report_number: u32,
        resource: Option<&Arc<R>>,
        queue: &mut impl CommandQueue,
    ) -> DriverResult<SlotTicket> {
        let ticket = self.ring.begin_submission(report_number, resource)?;
        let mut request = self.kick_request(ticket, report_number)?;

        loop {
            let reason = match queue.kick(&request) {
                Ok(()) => return Ok(ticket),
                Err(KickError::Fatal(reason)) => {
                    self.ring.force_status(ticket.sequence, false);
                    return Err(DriverError::KickFailed {
                        sequence: ticket.sequence,
                        reason,
                    });
                }
                Err(KickError::Recoverable(reason)) => reason,
            };

            if request.attempt >= self.retry.max_resubmits {
                self.ring.force_status(ticket.sequence, false);
                return Err(DriverError::RetriesExhausted {
                    sequence: ticket.sequence,
                    attempts: request.attempt + 1,
                    reason,
                });
            }

            warn!(
                "submission {} kick failed ({reason}), resubmitting",
                ticket.sequence
            );
            self.ring.resubmit(ticket.sequence)?;
            request.attempt += 1;
        }
    }

    pub fn query(&mut self, sequence: u64) -> StatusSnapshot<R> {
        self.ring.query(sequence)
    }

    /// Budgeted query; see [`Poller::poll`].
    pub fn poll(&mut self, sequence: u64) -> PollOutcome<R> {
        self.poller.poll(&mut self.ring, sequence)
    }

    /// Budgeted wait; see [`Poller::wait`].
    pub fn wait(
        &mut self,
        sequence: u64,
        between: impl FnMut(&mut StatusRing<R>),
    ) -> PollOutcome<R> {
        self.poller.wait(&mut self.ring, sequence, between)
    }

    /// Destroys the ring. Outstanding submissions become Unavailable.
    pub fn close(&mut self) {
        debug!(
            "closing session `{}`: {} submitted, {} outstanding",
            self.ring.name(),
            self.ring.submitted_count(),
            self.ring.outstanding()
        );
        self.ring.destroy();
    }

    fn kick_request(&self, ticket: SlotTicket, report_number: u32) -> DriverResult<KickRequest> {
        let stale = || DriverError::from(status_ring::RingError::StaleSlot {
            sequence: ticket.sequence,
        });
        let records = self
            .ring
            .engines()
            .map(|engine| self.ring.record_location(engine, ticket.sequence))
            .collect::<Option<SmallVec<_>>>()
            .ok_or_else(stale)?;
        let fence = self
            .ring
            .fence_location(ticket.sequence)
            .ok_or_else(stale)?;
        Ok(KickRequest {
            ticket,
            report_number,
            records,
            fence,
            attempt: 0,
        })
    }
}
