//! Ready-made consumers of first-success snapshots.

use crossbeam_channel::{bounded, Receiver};
use log::trace;
use parking_lot::Mutex;
use serde::Serialize;
use status_ring::{EngineId, NotifyError, ObserverHandle, StatusObserver, StatusSnapshot};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Promotes successfully decoded resources into a bounded list of references
/// usable by later submissions. The oldest entry is dropped once full.
pub struct ReferenceList<R> {
    capacity: usize,
    entries: Mutex<VecDeque<(u32, Arc<R>)>>,
}

impl<R> ReferenceList<R> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, report_number: u32) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|(number, _)| *number == report_number)
    }

    /// Report numbers in promotion order, oldest first.
    pub fn report_numbers(&self) -> Vec<u32> {
        self.entries.lock().iter().map(|(number, _)| *number).collect()
    }

    pub fn get(&self, report_number: u32) -> Option<Arc<R>> {
        self.entries
            .lock()
            .iter()
            .find(|(number, _)| *number == report_number)
            .map(|(_, resource)| Arc::clone(resource))
    }
}

impl<R> StatusObserver<R> for ReferenceList<R> {
    fn on_success(&self, snapshot: &StatusSnapshot<R>) -> Result<(), NotifyError> {
        let resource = snapshot
            .resource()
            .ok_or_else(|| NotifyError::rejected("frame resource no longer alive"))?;
        let report_number = snapshot
            .report_number
            .ok_or_else(|| NotifyError::rejected("snapshot has no report number"))?;

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back((report_number, resource));
        trace!("promoted report {report_number} to reference list");
        Ok(())
    }
}

/// Counters maintained by [`StatusTelemetry`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TelemetryCounts {
    pub successes: u64,
    /// Successes whose report number is lower than an earlier success.
    pub out_of_order: u64,
    pub last_report_number: Option<u32>,
    /// Per engine, how many successful units it skipped.
    pub skipped: BTreeMap<EngineId, u64>,
}

/// Observer counting first successes of one correlation id stream.
#[derive(Debug, Default)]
pub struct StatusTelemetry {
    counts: Mutex<TelemetryCounts>,
}

impl StatusTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> TelemetryCounts {
        self.counts.lock().clone()
    }
}

impl<R> StatusObserver<R> for StatusTelemetry {
    fn on_success(&self, snapshot: &StatusSnapshot<R>) -> Result<(), NotifyError> {
        let mut counts = self.counts.lock();
        counts.successes += 1;
        if let Some(number) = snapshot.report_number {
            if counts.last_report_number.is_some_and(|last| number < last) {
                counts.out_of_order += 1;
            }
            counts.last_report_number = Some(number);
        }
        for engine in snapshot.skipped_engines() {
            *counts.skipped.entry(engine).or_insert(0) += 1;
        }
        Ok(())
    }
}

/// Channel-backed observer. Delivery never blocks: a full channel is
/// reported as [`NotifyError::Backpressure`].
pub fn channel_observer<R>(bound: usize) -> (ObserverHandle<R>, Receiver<StatusSnapshot<R>>) {
    let (tx, rx) = bounded(bound);
    (ObserverHandle::Channel(tx), rx)
}
