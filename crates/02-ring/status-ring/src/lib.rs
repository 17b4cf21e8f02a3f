//! Asynchronous hardware-completion status tracking.
//!
//! A host submits units of work to one or more independently clocked engines
//! and later polls whether each unit finished. The pieces:
//! * [`StatusRing`] – fixed-capacity ring of report slots with the
//!   submission/query lifecycle.
//! * [`OffsetTable`] – per-layout field offsets, resolved once at creation.
//! * [`reduce`] / [`Evaluation`] – multi-engine reduction to a [`CodecStatus`].
//! * [`ObserverRegistry`] – exactly-once fan-out of first-success snapshots.
//! * [`RingError`] – creation and lifecycle failures; statuses are never errors.

mod config;
mod error;
mod evaluator;
pub mod layout;
mod notifier;
mod ring;
mod status;

pub use config::{EngineConfig, EngineId, RingConfig};
pub use error::{RingError, RingResult};
pub use evaluator::{classify_marker, reduce, Evaluation};
pub use layout::{LayoutRevision, OffsetTable, StatusField, MARKER_DONE, MARKER_SKIPPED};
pub use notifier::{
    NotifyError, NotifyReport, ObserverCallback, ObserverHandle, ObserverId, ObserverRegistry,
    StatusObserver,
};
pub use ring::{HardwareView, RecordLocation, SlotTicket, StatusRing};
pub use status::{CodecStatus, EngineCompletion, EngineReport, StatusSnapshot};
