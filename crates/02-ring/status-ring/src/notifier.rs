//! Fan-out of first-success snapshots to registered consumers.
//!
//! Consumers register a capability-typed [`ObserverHandle`]; the ring calls
//! [`ObserverRegistry::notify`] at most once per slot. A failing consumer never
//! undoes the status transition, it only shows up in the [`NotifyReport`].

use crate::status::StatusSnapshot;
use crossbeam_channel::{Sender, TrySendError};
use log::warn;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("observer channel disconnected")]
    Disconnected,

    #[error("observer channel full")]
    Backpressure,

    #[error("observer rejected snapshot: {0}")]
    Rejected(String),
}

impl NotifyError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        NotifyError::Rejected(msg.into())
    }
}

/// Consumer shared with other parts of the driver.
///
/// Implementations use interior mutability; the ring only holds a shared
/// reference.
pub trait StatusObserver<R> {
    fn on_success(&self, snapshot: &StatusSnapshot<R>) -> Result<(), NotifyError>;
}

pub type ObserverCallback<R> = Box<dyn FnMut(&StatusSnapshot<R>) -> Result<(), NotifyError>>;

/// How a registered consumer receives snapshots.
pub enum ObserverHandle<R> {
    /// Plain callback owned by the registry.
    Callback(ObserverCallback<R>),
    /// Non-blocking hand-off into a channel.
    Channel(Sender<StatusSnapshot<R>>),
    /// Consumer object shared with the rest of the driver.
    Shared(Arc<dyn StatusObserver<R>>),
}

impl<R> ObserverHandle<R> {
    pub fn callback(
        f: impl FnMut(&StatusSnapshot<R>) -> Result<(), NotifyError> + 'static,
    ) -> Self {
        ObserverHandle::Callback(Box::new(f))
    }

    fn deliver(&mut self, snapshot: &StatusSnapshot<R>) -> Result<(), NotifyError> {
        match self {
            ObserverHandle::Callback(f) => f(snapshot),
            ObserverHandle::Channel(tx) => tx.try_send(snapshot.clone()).map_err(|err| match err {
                TrySendError::Full(_) => NotifyError::Backpressure,
                TrySendError::Disconnected(_) => NotifyError::Disconnected,
            }),
            ObserverHandle::Shared(observer) => observer.on_success(snapshot),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ObserverHandle::Callback(_) => "callback",
            ObserverHandle::Channel(_) => "channel",
            ObserverHandle::Shared(_) => "shared",
        }
    }
}

impl<R> fmt::Debug for ObserverHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

#[derive(Debug)]
struct Registered<R> {
    id: ObserverId,
    name: String,
    handle: ObserverHandle<R>,
}

/// Result of one fan-out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failures: SmallVec<[(ObserverId, NotifyError); 2]>,
}

impl NotifyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct ObserverRegistry<R> {
    next_id: u32,
    observers: Vec<Registered<R>>,
}

impl<R> Default for ObserverRegistry<R> {
    fn default() -> Self {
        Self {
            next_id: 0,
            observers: Vec::new(),
        }
    }
}

impl<R> ObserverRegistry<R> {
    pub fn register(&mut self, name: impl Into<String>, handle: ObserverHandle<R>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.observers.push(Registered {
            id,
            name: name.into(),
            handle,
        });
        id
    }

    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|observer| observer.id != id);
        self.observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Delivers `snapshot` to every consumer in registration order.
    pub fn notify(&mut self, snapshot: &StatusSnapshot<R>) -> NotifyReport {
        let mut report = NotifyReport::default();
        for observer in &mut self.observers {
            match observer.handle.deliver(snapshot) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(
                        "observer `{}` ({}) failed for submission {}: {err}",
                        observer.name,
                        observer.handle.kind(),
                        snapshot.sequence
                    );
                    report.failures.push((observer.id, err));
                }
            }
        }
        report
    }
}
