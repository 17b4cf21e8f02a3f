//! Per-engine status record layouts.
//!
//! Every engine generation stores its completion record with a fixed layout.
//! The ring builds one [`OffsetTable`] per engine at creation time so the
//! query path only does offset arithmetic.
//!
//! ```text
//! Compact (16 bytes)                 Extended (64 bytes)
//! +0x00 completion marker            +0x00 completion marker
//! +0x04 error register mirror        +0x04 error register mirror
//! +0x08 lane 0 engine id             +0x08 lane 0..3 engine ids (4 x u32)
//! +0x0C checksum                     +0x18 checksum
//!                                    +0x1C work counter
//!                                    +0x20 reserved
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Marker written by an engine once it finished the unit of work.
pub const MARKER_DONE: u32 = 0x444F_4E45; // "DONE"
/// Marker pre-written by the host; stays in place when an engine never runs.
pub const MARKER_SKIPPED: u32 = 0x534B_4950; // "SKIP"

/// Maximum number of per-lane engine identifiers a record can carry.
pub const MAX_LANES: usize = 4;

/// Records are laid out on this stride boundary inside a status region.
pub const RECORD_ALIGNMENT: usize = 16;

/// Versioned record layout of an engine generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutRevision {
    /// Single-lane engines: marker, error mirror, engine id, checksum.
    #[default]
    Compact,
    /// Scalable engines with up to four lanes and a work counter.
    Extended,
}

/// Named diagnostic sub-field of a status record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusField {
    CompletionMarker,
    ErrorStatus,
    LaneEngineId(u8),
    Checksum,
    WorkCount,
}

const COMPACT_FIELDS: &[(StatusField, usize)] = &[
    (StatusField::CompletionMarker, 0x00),
    (StatusField::ErrorStatus, 0x04),
    (StatusField::LaneEngineId(0), 0x08),
    (StatusField::Checksum, 0x0C),
];

const EXTENDED_FIELDS: &[(StatusField, usize)] = &[
    (StatusField::CompletionMarker, 0x00),
    (StatusField::ErrorStatus, 0x04),
    (StatusField::LaneEngineId(0), 0x08),
    (StatusField::LaneEngineId(1), 0x0C),
    (StatusField::LaneEngineId(2), 0x10),
    (StatusField::LaneEngineId(3), 0x14),
    (StatusField::Checksum, 0x18),
    (StatusField::WorkCount, 0x1C),
];

impl LayoutRevision {
    /// Size in bytes of one record.
    pub const fn record_size(self) -> usize {
        match self {
            LayoutRevision::Compact => 16,
            LayoutRevision::Extended => 64,
        }
    }

    /// Bits of the error register mirror that signal a faulted unit of work.
    ///
    /// The extended layout's upper half carries informational counters.
    pub const fn error_mask(self) -> u32 {
        match self {
            LayoutRevision::Compact => u32::MAX,
            LayoutRevision::Extended => 0x0000_FFFF,
        }
    }

    fn fields(self) -> &'static [(StatusField, usize)] {
        match self {
            LayoutRevision::Compact => COMPACT_FIELDS,
            LayoutRevision::Extended => EXTENDED_FIELDS,
        }
    }
}

/// Field offsets of one record layout, resolved once.
#[derive(Clone, Debug)]
pub struct OffsetTable {
    revision: LayoutRevision,
    record_size: usize,
    stride: usize,
    error_mask: u32,
    marker: usize,
    error: usize,
    checksum: Option<usize>,
    work_count: Option<usize>,
    lanes: Vec<usize>,
    fields: HashMap<StatusField, usize>,
}

impl OffsetTable {
    pub fn new(revision: LayoutRevision) -> Self {
        let record_size = revision.record_size();
        let fields: HashMap<StatusField, usize> = revision.fields().iter().copied().collect();
        debug_assert!(fields.values().all(|offset| offset + 4 <= record_size));

        let mut lanes: Vec<(u8, usize)> = fields
            .iter()
            .filter_map(|(field, offset)| match field {
                StatusField::LaneEngineId(lane) => Some((*lane, *offset)),
                _ => None,
            })
            .collect();
        lanes.sort_unstable();

        Self {
            revision,
            record_size,
            stride: record_size.next_multiple_of(RECORD_ALIGNMENT),
            error_mask: revision.error_mask(),
            marker: fields[&StatusField::CompletionMarker],
            error: fields[&StatusField::ErrorStatus],
            checksum: fields.get(&StatusField::Checksum).copied(),
            work_count: fields.get(&StatusField::WorkCount).copied(),
            lanes: lanes.into_iter().map(|(_, offset)| offset).collect(),
            fields,
        }
    }

    pub fn revision(&self) -> LayoutRevision {
        self.revision
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Distance in bytes between consecutive records.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn error_mask(&self) -> u32 {
        self.error_mask
    }

    /// Offset of `field` within a record, if the layout has it.
    pub fn offset(&self, field: StatusField) -> Option<usize> {
        self.fields.get(&field).copied()
    }

    /// Byte offset of the record for ring position `index`.
    pub fn record_offset(&self, index: u32) -> usize {
        index as usize * self.stride
    }

    /// Bytes needed to hold `capacity` records.
    pub fn region_len(&self, capacity: u32) -> usize {
        capacity as usize * self.stride
    }

    pub(crate) fn marker(&self) -> usize {
        self.marker
    }

    pub(crate) fn error(&self) -> usize {
        self.error
    }

    pub(crate) fn checksum(&self) -> Option<usize> {
        self.checksum
    }

    pub(crate) fn work_count(&self) -> Option<usize> {
        self.work_count
    }

    pub(crate) fn lanes(&self) -> &[usize] {
        &self.lanes
    }
}
