//! Reference submission driver on top of [`status_ring`].
//!
//! A [`Session`] owns one ring and runs the begin → kick → poll cycle:
//! recoverable kick failures are retried through `resubmit`
//! ([`RetryPolicy`]), polling is budgeted ([`Poller`], [`PollPolicy`]) so a
//! hung engine ends in an abandoned slot rather than an endless wait, and
//! the [`observers`] module provides consumers for first-success snapshots.

mod error;
pub mod observers;
mod poller;
mod policy;
mod session;

pub use error::{DriverError, DriverResult};
pub use observers::{channel_observer, ReferenceList, StatusTelemetry, TelemetryCounts};
pub use poller::{PollOutcome, Poller};
pub use policy::{PollPolicy, RetryPolicy};
pub use session::{CommandQueue, KickError, KickRequest, Session};
