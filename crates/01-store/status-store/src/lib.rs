//! Mapped memory that hardware engines write status records into.
//!
//! * [`SharedRegion`] – contiguous, aligned memory with volatile word access.
//! * [`RegionAllocator`] / [`RegionRequest`] – allocation interface tagged with
//!   debug name, access direction and sync policy.
//! * [`SystemAllocator`] – host-memory allocator with an optional budget.
//! * [`StoreError`] – allocation and validation failures.

mod alloc;
mod error;
mod region;

pub use alloc::{
    MappedRegion, RegionAccess, RegionAllocator, RegionLedger, RegionRequest, SystemAllocator,
    REGION_ALIGNMENT,
};
pub use error::{StoreError, StoreResult};
pub use region::SharedRegion;
