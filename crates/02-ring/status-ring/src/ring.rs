//! Fixed-capacity ring of report slots.
//!
//! Layout of the mapped regions owned by one ring:
//!
//! ```text
//! fence region   [u64; capacity]                 hardware stores `sequence + 1`
//!                                                 into word `index` on retire
//! engine region  [record; capacity] per engine   hardware stores marker and
//!                                                 diagnostics into `index`
//! ```
//!
//! Submission `s` lives at `index = s mod capacity` and stays readable while
//! fewer than `capacity` later submissions exist. The host primes each engine
//! record with the skip sentinel; the fence word gates evaluation so a slot
//! whose batch has not retired is `Incomplete` regardless of record contents.

use crate::config::{EngineId, RingConfig};
use crate::evaluator::{CompletionEvaluator, EngineStore};
use crate::layout::{OffsetTable, StatusField};
use crate::notifier::{ObserverHandle, ObserverId, ObserverRegistry};
use crate::status::{CodecStatus, EngineReport, StatusSnapshot};
use crate::{RingError, RingResult};
use log::{debug, trace, warn};
use smallvec::SmallVec;
use status_store::{MappedRegion, RegionAllocator, RegionRequest};
use std::mem::size_of;
use std::sync::atomic::{fence, Ordering};
use std::sync::{Arc, Weak};

const FENCE_WORD_BYTES: usize = size_of::<u64>();

/// Handle returned by [`StatusRing::begin_submission`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotTicket {
    /// Monotonic submission counter value of this unit of work.
    pub sequence: u64,
    /// Ring position, `sequence mod capacity`.
    pub index: u32,
}

/// Byte range inside one of the ring's mapped regions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordLocation {
    pub region: String,
    pub offset: usize,
    pub len: usize,
}

struct ReportSlot<R> {
    sequence: Option<u64>,
    report_number: u32,
    resource: Option<Weak<R>>,
    status: CodecStatus,
    engines: SmallVec<[EngineReport; 4]>,
    notified: bool,
    reported: bool,
    abandoned: bool,
}

impl<R> ReportSlot<R> {
    fn empty() -> Self {
        Self {
            sequence: None,
            report_number: 0,
            resource: None,
            status: CodecStatus::Unavailable,
            engines: SmallVec::new(),
            notified: false,
            reported: false,
            abandoned: false,
        }
    }

    fn primed(sequence: u64, report_number: u32, resource: Option<Weak<R>>) -> Self {
        Self {
            sequence: Some(sequence),
            report_number,
            resource,
            ..Self::empty()
        }
    }

    fn snapshot(&self, sequence: u64) -> StatusSnapshot<R> {
        StatusSnapshot {
            sequence,
            report_number: Some(self.report_number),
            resource: self.resource.clone(),
            codec_status: self.status,
            engines: self.engines.clone(),
        }
    }

    fn snapshot_as(&self, sequence: u64, status: CodecStatus) -> StatusSnapshot<R> {
        StatusSnapshot {
            codec_status: status,
            ..self.snapshot(sequence)
        }
    }
}

/// Status ring for one decode/encode/processing session.
///
/// `R` is the frame resource type; slots only hold weak references to it.
/// All methods take `&mut self`: callers serialize access, and hardware is
/// the only other writer of the mapped regions.
pub struct StatusRing<R> {
    name: String,
    capacity: u32,
    fence: Option<MappedRegion>,
    evaluator: CompletionEvaluator,
    slots: Vec<ReportSlot<R>>,
    submitted: u64,
    reported: u64,
    observers: ObserverRegistry<R>,
    notify_failures: u64,
}

impl<R> StatusRing<R> {
    /// Allocates the fence region and one status region per enabled engine.
    ///
    /// On failure every region allocated so far is released before the error
    /// is returned.
    pub fn create(config: &RingConfig, allocator: &mut dyn RegionAllocator) -> RingResult<Self> {
        config.validate()?;
        let capacity = config.capacity;

        let fence = allocator.allocate(&RegionRequest::hw_status(
            format!("{}.fence", config.name),
            capacity as usize * FENCE_WORD_BYTES,
        ))?;

        let mut engines = Vec::new();
        for engine in config.enabled_engines() {
            let table = OffsetTable::new(engine.layout);
            let request = RegionRequest::hw_status(
                format!("{}.{}", config.name, engine.name),
                table.region_len(capacity),
            );
            let region = allocator.allocate(&request)?;
            engines.push(EngineStore::new(engine, table, region));
        }

        debug!(
            "created status ring `{}`: capacity={} engines={}",
            config.name,
            capacity,
            engines.len()
        );

        Ok(Self {
            name: config.name.clone(),
            capacity,
            fence: Some(fence),
            evaluator: CompletionEvaluator::new(engines),
            slots: (0..capacity).map(|_| ReportSlot::empty()).collect(),
            submitted: 0,
            reported: 0,
            observers: ObserverRegistry::default(),
            notify_failures: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of submissions started so far.
    pub fn submitted_count(&self) -> u64 {
        self.submitted
    }

    /// Number of submissions whose terminal status was delivered, plus
    /// submissions evicted before anyone saw one.
    pub fn reported_count(&self) -> u64 {
        self.reported
    }

    /// Submissions still waiting for a terminal report; never exceeds capacity.
    pub fn outstanding(&self) -> u64 {
        self.submitted - self.reported
    }

    /// Observer notifications that failed since creation.
    pub fn notify_failures(&self) -> u64 {
        self.notify_failures
    }

    pub fn is_destroyed(&self) -> bool {
        self.fence.is_none()
    }

    pub fn index_of(&self, sequence: u64) -> u32 {
        (sequence % u64::from(self.capacity)) as u32
    }

    /// Ring position of `sequence` if its slot still holds that submission.
    pub fn live_index(&self, sequence: u64) -> Option<u32> {
        if self.is_destroyed() || sequence >= self.submitted {
            return None;
        }
        if self.submitted - sequence > u64::from(self.capacity) {
            return None;
        }
        let index = self.index_of(sequence);
        debug_assert_eq!(self.slots[index as usize].sequence, Some(sequence));
        Some(index)
    }

    /// True while `sequence` is held by the ring and was abandoned through
    /// `force_status(sequence, false)` before it resolved.
    pub fn is_abandoned(&self, sequence: u64) -> bool {
        self.live_index(sequence)
            .is_some_and(|index| self.slots[index as usize].abandoned)
    }

    pub fn engines(&self) -> impl Iterator<Item = EngineId> + '_ {
        self.evaluator.engines().iter().map(EngineStore::id)
    }

    pub fn offset_table(&self, engine: EngineId) -> Option<&OffsetTable> {
        self.evaluator
            .engines()
            .iter()
            .find(|store| store.id() == engine)
            .map(EngineStore::table)
    }

    pub fn register_observer(
        &mut self,
        name: impl Into<String>,
        handle: ObserverHandle<R>,
    ) -> ObserverId {
        self.observers.register(name, handle)
    }

    pub fn unregister_observer(&mut self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    /// Claims the next slot for a new unit of work.
    ///
    /// Must be called for every unit, including ones without a resource.
    pub fn begin_submission(
        &mut self,
        report_number: u32,
        resource: Option<&Arc<R>>,
    ) -> RingResult<SlotTicket> {
        if self.is_destroyed() {
            return Err(RingError::Destroyed(self.name.clone()));
        }

        let sequence = self.submitted;
        let index = self.index_of(sequence);
        let slot = &mut self.slots[index as usize];
        if let Some(previous) = slot.sequence {
            if !slot.reported {
                debug!(
                    "ring `{}`: submission {previous} evicted before a terminal report ({:?})",
                    self.name, slot.status
                );
                self.reported += 1;
            }
        }
        *slot = ReportSlot::primed(sequence, report_number, resource.map(Arc::downgrade));

        self.evaluator.prime_skipped(index);
        self.submitted += 1;
        trace!(
            "ring `{}`: begin submission {sequence} at index {index} (report {report_number})",
            self.name
        );
        Ok(SlotTicket { sequence, index })
    }

    /// Zero-fills the engine records of `sequence` ahead of a retry.
    ///
    /// Host metadata and the slot status are left as they are.
    pub fn resubmit(&mut self, sequence: u64) -> RingResult<SlotTicket> {
        if self.is_destroyed() {
            return Err(RingError::Destroyed(self.name.clone()));
        }
        let index = self
            .live_index(sequence)
            .ok_or(RingError::StaleSlot { sequence })?;

        let slot = &self.slots[index as usize];
        if slot.status.is_terminal() {
            warn!(
                "ring `{}`: resubmit of submission {sequence} after it resolved {:?}",
                self.name, slot.status
            );
        }
        self.evaluator.clear(index);
        debug!("ring `{}`: resubmit {sequence} at index {index}", self.name);
        Ok(SlotTicket { sequence, index })
    }

    /// Resolves the status of `sequence` without blocking.
    pub fn query(&mut self, sequence: u64) -> StatusSnapshot<R> {
        let Some(index) = self.live_index(sequence) else {
            trace!("ring `{}`: submission {sequence} out of range", self.name);
            return StatusSnapshot::unavailable(sequence);
        };

        let retired = self.fence_reached(index, sequence);
        let slot = &mut self.slots[index as usize];
        if slot.status.is_terminal() || slot.abandoned {
            return slot.snapshot(sequence);
        }

        if !retired {
            slot.status = CodecStatus::Incomplete;
            return slot.snapshot(sequence);
        }

        let evaluation = self.evaluator.evaluate(index);
        trace!(
            "ring `{}`: submission {sequence} evaluated {:?}",
            self.name,
            evaluation.status
        );
        slot.status = evaluation.status;
        slot.engines = evaluation.engines;

        if slot.status.is_terminal() && !slot.reported {
            slot.reported = true;
            self.reported += 1;
        }

        let snapshot = slot.snapshot(sequence);
        if snapshot.codec_status == CodecStatus::Successful && !slot.notified {
            slot.notified = true;
            let report = self.observers.notify(&snapshot);
            self.notify_failures += report.failures.len() as u64;
        }
        snapshot
    }

    /// Reports `sequence` as Unavailable (`out_of_range`) or Incomplete
    /// without looking at hardware-written bytes.
    ///
    /// Forcing Incomplete abandons the slot: later queries keep answering
    /// Incomplete. A slot that already resolved keeps its terminal status.
    pub fn force_status(&mut self, sequence: u64, out_of_range: bool) -> StatusSnapshot<R> {
        let Some(index) = self.live_index(sequence) else {
            return StatusSnapshot::unavailable(sequence);
        };
        let slot = &mut self.slots[index as usize];

        if out_of_range {
            debug!(
                "ring `{}`: submission {sequence} forced unavailable",
                self.name
            );
            return slot.snapshot_as(sequence, CodecStatus::Unavailable);
        }

        if slot.status.is_terminal() {
            return slot.snapshot(sequence);
        }

        warn!(
            "ring `{}`: abandoning submission {sequence} (report {})",
            self.name, slot.report_number
        );
        slot.status = CodecStatus::Incomplete;
        slot.abandoned = true;
        if !slot.reported {
            slot.reported = true;
            self.reported += 1;
        }
        slot.snapshot(sequence)
    }

    /// Location of `engine`'s record for `sequence`, for programming the
    /// hardware's status store command.
    pub fn record_location(&self, engine: EngineId, sequence: u64) -> Option<RecordLocation> {
        let index = self.live_index(sequence)?;
        let store = self
            .evaluator
            .engines()
            .iter()
            .find(|store| store.id() == engine)?;
        Some(RecordLocation {
            region: format!("{}.{}", self.name, store.name()),
            offset: store.table().record_offset(index),
            len: store.table().record_size(),
        })
    }

    /// Location of the fence word hardware writes when `sequence` retires.
    pub fn fence_location(&self, sequence: u64) -> Option<RecordLocation> {
        let index = self.live_index(sequence)?;
        Some(RecordLocation {
            region: format!("{}.fence", self.name),
            offset: index as usize * FENCE_WORD_BYTES,
            len: FENCE_WORD_BYTES,
        })
    }

    /// Device-side writer over the ring's mapped regions.
    ///
    /// Returns `None` once the ring has been destroyed.
    pub fn hardware_view(&mut self) -> Option<HardwareView<'_>> {
        let capacity = self.capacity;
        let fence = self.fence.as_mut()?;
        Some(HardwareView {
            capacity,
            fence,
            evaluator: &mut self.evaluator,
        })
    }

    /// Releases every mapped region. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.fence.take().is_none() {
            return;
        }
        self.evaluator.release();
        debug!(
            "destroyed status ring `{}` after {} submissions",
            self.name, self.submitted
        );
    }

    fn fence_reached(&self, index: u32, sequence: u64) -> bool {
        let Some(region) = &self.fence else {
            return false;
        };
        let retired = region.read_u64(index as usize * FENCE_WORD_BYTES);
        fence(Ordering::Acquire);
        retired > sequence
    }
}

impl<R> Drop for StatusRing<R> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Writes performed by hardware engines, expressed against ring positions.
pub struct HardwareView<'a> {
    capacity: u32,
    fence: &'a mut MappedRegion,
    evaluator: &'a mut CompletionEvaluator,
}

impl HardwareView<'_> {
    pub fn index_of(&self, sequence: u64) -> u32 {
        (sequence % u64::from(self.capacity)) as u32
    }

    /// Stores `value` into `field` of `engine`'s record for `sequence`.
    ///
    /// Returns false when the engine is not part of the ring or its layout
    /// lacks the field.
    pub fn write_field(
        &mut self,
        engine: EngineId,
        sequence: u64,
        field: StatusField,
        value: u32,
    ) -> bool {
        let index = self.index_of(sequence);
        match self.evaluator.engine_mut(engine) {
            Some(store) => store.write_field(index, field, value),
            None => false,
        }
    }

    /// Marks the batch carrying `sequence` as retired.
    pub fn retire(&mut self, sequence: u64) {
        let index = self.index_of(sequence);
        fence(Ordering::Release);
        self.fence
            .write_u64(index as usize * FENCE_WORD_BYTES, sequence + 1);
    }
}
