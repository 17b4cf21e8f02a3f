//! Status values and the snapshots handed to callers and observers.

use crate::config::EngineId;
use crate::layout::MAX_LANES;
use smallvec::SmallVec;
use std::fmt;
use std::sync::{Arc, Weak};

/// Resolved status of one unit of submitted work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CodecStatus {
    /// No data available: the slot was never queried, was evicted, or the
    /// query was for a submission that does not exist yet.
    #[default]
    Unavailable,
    /// At least one engine has not reported completion.
    Incomplete,
    /// Every engine completed and none flagged an error.
    Successful,
    /// Every engine completed and at least one flagged an error.
    Error,
}

impl CodecStatus {
    /// Successful and Error never change once observed.
    pub fn is_terminal(self) -> bool {
        matches!(self, CodecStatus::Successful | CodecStatus::Error)
    }
}

/// How a single engine's record resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineCompletion {
    /// Marker is neither the done nor the skip sentinel.
    Pending,
    /// The engine wrote its done marker.
    Ran,
    /// The host's skip sentinel is still in place.
    Skipped,
}

impl EngineCompletion {
    pub fn is_complete(self) -> bool {
        !matches!(self, EngineCompletion::Pending)
    }
}

/// Diagnostics read from one engine's record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineReport {
    pub engine: EngineId,
    pub completion: EngineCompletion,
    /// Error register mirror with the layout's error mask applied.
    pub error_bits: u32,
    pub checksum: Option<u32>,
    pub work_count: Option<u32>,
    pub lane_ids: SmallVec<[u32; MAX_LANES]>,
}

impl EngineReport {
    pub fn has_error(&self) -> bool {
        self.error_bits != 0
    }
}

/// Immutable copy of a slot's resolved status.
///
/// Snapshots never point into ring memory; holding one across later
/// submissions is always safe.
pub struct StatusSnapshot<R> {
    /// Submission this snapshot answers for.
    pub sequence: u64,
    /// Caller-supplied correlation id; `None` when the slot is not held.
    pub report_number: Option<u32>,
    pub resource: Option<Weak<R>>,
    pub codec_status: CodecStatus,
    /// Per-engine diagnostics of the last evaluation. Empty until the batch
    /// fence for the submission has been reached.
    pub engines: SmallVec<[EngineReport; 4]>,
}

impl<R> StatusSnapshot<R> {
    pub(crate) fn unavailable(sequence: u64) -> Self {
        Self {
            sequence,
            report_number: None,
            resource: None,
            codec_status: CodecStatus::Unavailable,
            engines: SmallVec::new(),
        }
    }

    /// Upgrades the weak resource reference, if the resource is still alive.
    pub fn resource(&self) -> Option<Arc<R>> {
        self.resource.as_ref().and_then(Weak::upgrade)
    }

    /// Engines that never ran for this unit of work.
    pub fn skipped_engines(&self) -> impl Iterator<Item = EngineId> + '_ {
        self.engines
            .iter()
            .filter(|report| report.completion == EngineCompletion::Skipped)
            .map(|report| report.engine)
    }
}

impl<R> Clone for StatusSnapshot<R> {
    fn clone(&self) -> Self {
        Self {
            sequence: self.sequence,
            report_number: self.report_number,
            resource: self.resource.clone(),
            codec_status: self.codec_status,
            engines: self.engines.clone(),
        }
    }
}

impl<R> fmt::Debug for StatusSnapshot<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusSnapshot")
            .field("sequence", &self.sequence)
            .field("report_number", &self.report_number)
            .field("has_resource", &self.resource.is_some())
            .field("codec_status", &self.codec_status)
            .field("engines", &self.engines)
            .finish()
    }
}
