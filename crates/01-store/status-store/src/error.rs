//! Error handling helpers for the status store crate.
//!
//! The store keeps its error surface small: request validation and allocation
//! failures. Both are creation-time problems; nothing on the query path can
//! fail once a region exists.

use thiserror::Error;

/// Convenience result alias for fallible store operations.
pub type StoreResult<T, E = StoreError> = Result<T, E>;

/// Errors surfaced by region allocation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested region size is below the minimum the store accepts.
    #[error("region `{name}` size {requested} must be at least {minimum} bytes")]
    InvalidSize {
        name: String,
        requested: usize,
        minimum: usize,
    },

    /// Allocation of a mapped region failed for the given size/alignment pair.
    #[error("failed to allocate region `{name}` of {size} bytes aligned to {alignment}")]
    AllocationFailed {
        name: String,
        size: usize,
        alignment: usize,
    },

    /// The allocator's byte budget cannot satisfy the request.
    #[error("region `{name}` needs {requested} bytes but only {available} remain in budget")]
    BudgetExhausted {
        name: String,
        requested: usize,
        available: usize,
    },
}
