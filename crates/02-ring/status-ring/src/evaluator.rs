//! Reduces per-engine status records to a single [`CodecStatus`].
//!
//! Each enabled engine owns one mapped region holding `capacity` records. A
//! record is complete when its marker equals [`MARKER_DONE`] or
//! [`MARKER_SKIPPED`]; the slot is complete only when every engine agrees.

use crate::config::{EngineConfig, EngineId};
use crate::layout::{OffsetTable, StatusField, MARKER_DONE, MARKER_SKIPPED};
use crate::status::{CodecStatus, EngineCompletion, EngineReport};
use smallvec::SmallVec;
use status_store::MappedRegion;
use std::sync::atomic::{fence, Ordering};

/// Mapped store of one engine plus its resolved layout.
#[derive(Debug)]
pub(crate) struct EngineStore {
    id: EngineId,
    name: String,
    table: OffsetTable,
    region: MappedRegion,
}

impl EngineStore {
    pub(crate) fn new(config: &EngineConfig, table: OffsetTable, region: MappedRegion) -> Self {
        Self {
            id: config.id,
            name: config.name.clone(),
            table,
            region,
        }
    }

    pub(crate) fn id(&self) -> EngineId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn table(&self) -> &OffsetTable {
        &self.table
    }

    fn read(&self, index: u32) -> EngineReport {
        let base = self.table.record_offset(index);
        let marker = self.region.read_u32(base + self.table.marker());
        // Diagnostics written before the marker must not be read ahead of it.
        fence(Ordering::Acquire);

        let completion = classify_marker(marker);
        let error_bits = self.region.read_u32(base + self.table.error()) & self.table.error_mask();
        EngineReport {
            engine: self.id,
            completion,
            error_bits,
            checksum: self
                .table
                .checksum()
                .map(|offset| self.region.read_u32(base + offset)),
            work_count: self
                .table
                .work_count()
                .map(|offset| self.region.read_u32(base + offset)),
            lane_ids: self
                .table
                .lanes()
                .iter()
                .map(|offset| self.region.read_u32(base + offset))
                .collect(),
        }
    }

    fn clear(&mut self, index: u32) {
        let base = self.table.record_offset(index);
        let len = self.table.record_size();
        self.region.fill(base, len, 0);
    }

    fn prime_skipped(&mut self, index: u32) {
        self.clear(index);
        let base = self.table.record_offset(index);
        let marker = self.table.marker();
        self.region.write_u32(base + marker, MARKER_SKIPPED);
    }

    pub(crate) fn write_field(&mut self, index: u32, field: StatusField, value: u32) -> bool {
        let Some(offset) = self.table.offset(field) else {
            return false;
        };
        let base = self.table.record_offset(index);
        self.region.write_u32(base + offset, value);
        true
    }
}

/// Maps a raw completion marker onto an [`EngineCompletion`].
pub fn classify_marker(marker: u32) -> EngineCompletion {
    match marker {
        MARKER_DONE => EngineCompletion::Ran,
        MARKER_SKIPPED => EngineCompletion::Skipped,
        _ => EngineCompletion::Pending,
    }
}

/// Outcome of evaluating one ring position across all engines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub status: CodecStatus,
    pub engines: SmallVec<[EngineReport; 4]>,
}

/// Logical AND of engine completions; error if any completed engine faulted.
pub fn reduce(engines: &[EngineReport]) -> CodecStatus {
    if engines.is_empty() || !engines.iter().all(|e| e.completion.is_complete()) {
        return CodecStatus::Incomplete;
    }
    if engines.iter().any(EngineReport::has_error) {
        CodecStatus::Error
    } else {
        CodecStatus::Successful
    }
}

#[derive(Debug, Default)]
pub(crate) struct CompletionEvaluator {
    engines: Vec<EngineStore>,
}

impl CompletionEvaluator {
    pub(crate) fn new(engines: Vec<EngineStore>) -> Self {
        Self { engines }
    }

    pub(crate) fn evaluate(&self, index: u32) -> Evaluation {
        let engines: SmallVec<[EngineReport; 4]> =
            self.engines.iter().map(|store| store.read(index)).collect();
        Evaluation {
            status: reduce(&engines),
            engines,
        }
    }

    /// Writes the skip sentinel into every engine's record at `index`.
    pub(crate) fn prime_skipped(&mut self, index: u32) {
        for store in &mut self.engines {
            store.prime_skipped(index);
        }
    }

    /// Zero-fills every engine's record at `index`.
    pub(crate) fn clear(&mut self, index: u32) {
        for store in &mut self.engines {
            store.clear(index);
        }
    }

    pub(crate) fn engines(&self) -> &[EngineStore] {
        &self.engines
    }

    pub(crate) fn engine_mut(&mut self, id: EngineId) -> Option<&mut EngineStore> {
        self.engines.iter_mut().find(|store| store.id == id)
    }

    /// Drops every engine region.
    pub(crate) fn release(&mut self) {
        self.engines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutRevision;
    use status_store::{RegionAllocator, RegionRequest, SystemAllocator};

    fn store(id: u8, layout: LayoutRevision, capacity: u32) -> EngineStore {
        let table = OffsetTable::new(layout);
        let region = SystemAllocator::new()
            .allocate(&RegionRequest::hw_status("test", table.region_len(capacity)))
            .expect("allocate");
        EngineStore::new(&EngineConfig::new(id, "test", layout), table, region)
    }

    fn report(engine: u8, completion: EngineCompletion, error_bits: u32) -> EngineReport {
        EngineReport {
            engine: EngineId(engine),
            completion,
            error_bits,
            checksum: None,
            work_count: None,
            lane_ids: SmallVec::new(),
        }
    }

    #[test]
    fn classify_marker_values() {
        assert_eq!(classify_marker(MARKER_DONE), EngineCompletion::Ran);
        assert_eq!(classify_marker(MARKER_SKIPPED), EngineCompletion::Skipped);
        assert_eq!(classify_marker(0), EngineCompletion::Pending);
        assert_eq!(classify_marker(0xDEAD_BEEF), EngineCompletion::Pending);
    }

    #[test]
    fn reduce_requires_every_engine() {
        let both_done = [
            report(0, EngineCompletion::Ran, 0),
            report(1, EngineCompletion::Skipped, 0),
        ];
        assert_eq!(reduce(&both_done), CodecStatus::Successful);

        let one_pending = [
            report(0, EngineCompletion::Ran, 0),
            report(1, EngineCompletion::Pending, 0),
        ];
        assert_eq!(reduce(&one_pending), CodecStatus::Incomplete);

        let pending_with_error = [
            report(0, EngineCompletion::Ran, 1),
            report(1, EngineCompletion::Pending, 0),
        ];
        assert_eq!(reduce(&pending_with_error), CodecStatus::Incomplete);

        let faulted = [
            report(0, EngineCompletion::Ran, 0),
            report(1, EngineCompletion::Ran, 0x10),
        ];
        assert_eq!(reduce(&faulted), CodecStatus::Error);

        assert_eq!(reduce(&[]), CodecStatus::Incomplete);
    }

    #[test]
    fn primed_record_reads_as_skipped() {
        let mut evaluator = CompletionEvaluator::new(vec![store(0, LayoutRevision::Compact, 4)]);
        assert_eq!(evaluator.evaluate(2).status, CodecStatus::Incomplete);

        evaluator.prime_skipped(2);
        let evaluation = evaluator.evaluate(2);
        assert_eq!(evaluation.status, CodecStatus::Successful);
        assert_eq!(evaluation.engines[0].completion, EngineCompletion::Skipped);

        evaluator.clear(2);
        assert_eq!(evaluator.evaluate(2).status, CodecStatus::Incomplete);
    }

    #[test]
    fn extended_error_mask_ignores_upper_half() {
        let mut evaluator =
            CompletionEvaluator::new(vec![store(1, LayoutRevision::Extended, 2)]);
        let engine = evaluator.engine_mut(EngineId(1)).expect("engine");
        engine.write_field(0, StatusField::CompletionMarker, MARKER_DONE);
        engine.write_field(0, StatusField::ErrorStatus, 0xFFFF_0000);
        engine.write_field(0, StatusField::LaneEngineId(2), 7);
        engine.write_field(0, StatusField::WorkCount, 1200);

        let evaluation = evaluator.evaluate(0);
        assert_eq!(evaluation.status, CodecStatus::Successful);
        let report = &evaluation.engines[0];
        assert_eq!(report.lane_ids.as_slice(), &[0, 0, 7, 0]);
        assert_eq!(report.work_count, Some(1200));

        let engine = evaluator.engine_mut(EngineId(1)).expect("engine");
        engine.write_field(0, StatusField::ErrorStatus, 0x0000_0004);
        assert_eq!(evaluator.evaluate(0).status, CodecStatus::Error);
    }

    #[test]
    fn records_are_isolated_by_index() {
        let mut evaluator = CompletionEvaluator::new(vec![store(0, LayoutRevision::Compact, 4)]);
        let engine = evaluator.engine_mut(EngineId(0)).expect("engine");
        assert!(engine.write_field(1, StatusField::CompletionMarker, MARKER_DONE));
        assert!(!engine.write_field(1, StatusField::WorkCount, 1));

        assert_eq!(evaluator.evaluate(1).status, CodecStatus::Successful);
        assert_eq!(evaluator.evaluate(0).status, CodecStatus::Incomplete);
        assert_eq!(evaluator.evaluate(2).status, CodecStatus::Incomplete);
    }
}
