//! Allocator interface for mapped status regions.

use crate::region::SharedRegion;
use crate::{StoreError, StoreResult};
use log::debug;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Minimum alignment handed out for mapped status regions.
pub const REGION_ALIGNMENT: usize = 4096;

/// Which side of the host/device boundary writes the region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionAccess {
    /// Written by hardware, read by the host. Allocators should pick an
    /// uncached or snooped mapping so host reads observe device writes.
    HwWriteHostRead,
    /// Written by the host, read by hardware.
    HostWriteHwRead,
}

/// Description of a mapped region requested from an allocator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionRequest {
    /// Human-readable tag used in logs and allocator dumps.
    pub debug_name: String,
    /// Size in bytes.
    pub size: usize,
    /// Required base alignment.
    pub alignment: usize,
    /// Access direction, used to choose the cache policy.
    pub access: RegionAccess,
    /// Skip implicit CPU/GPU sync fencing; the caller manages consistency.
    pub skip_sync: bool,
}

impl RegionRequest {
    /// Request for a status region written by hardware and read by the host.
    ///
    /// Status regions never take part in implicit sync fencing.
    pub fn hw_status(debug_name: impl Into<String>, size: usize) -> Self {
        Self {
            debug_name: debug_name.into(),
            size,
            alignment: REGION_ALIGNMENT,
            access: RegionAccess::HwWriteHostRead,
            skip_sync: true,
        }
    }
}

/// Region handed out by a [`RegionAllocator`].
///
/// Dropping the region releases it back to its allocator.
#[derive(Debug)]
pub struct MappedRegion {
    debug_name: String,
    access: RegionAccess,
    skip_sync: bool,
    region: SharedRegion,
    ledger: Option<RegionLedger>,
}

impl MappedRegion {
    /// Wraps an already allocated region.
    pub fn new(request: &RegionRequest, region: SharedRegion) -> Self {
        Self {
            debug_name: request.debug_name.clone(),
            access: request.access,
            skip_sync: request.skip_sync,
            region,
            ledger: None,
        }
    }

    fn tracked(request: &RegionRequest, region: SharedRegion, ledger: RegionLedger) -> Self {
        ledger.acquire(region.len());
        Self {
            debug_name: request.debug_name.clone(),
            access: request.access,
            skip_sync: request.skip_sync,
            region,
            ledger: Some(ledger),
        }
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub fn access(&self) -> RegionAccess {
        self.access
    }

    pub fn skip_sync(&self) -> bool {
        self.skip_sync
    }
}

impl Deref for MappedRegion {
    type Target = SharedRegion;

    fn deref(&self) -> &Self::Target {
        &self.region
    }
}

impl DerefMut for MappedRegion {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.region
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if let Some(ledger) = &self.ledger {
            ledger.release(self.region.len());
            debug!("released region `{}`", self.debug_name);
        }
    }
}

/// Source of mapped status regions.
pub trait RegionAllocator {
    /// Allocates a region matching `request`.
    fn allocate(&mut self, request: &RegionRequest) -> StoreResult<MappedRegion>;
}

/// Live region accounting shared between an allocator and its regions.
#[derive(Clone, Debug, Default)]
pub struct RegionLedger {
    inner: Arc<LedgerInner>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    regions: AtomicUsize,
    bytes: AtomicUsize,
}

impl RegionLedger {
    /// Number of regions currently alive.
    pub fn live_regions(&self) -> usize {
        self.inner.regions.load(Ordering::Acquire)
    }

    /// Bytes currently held by live regions.
    pub fn live_bytes(&self) -> usize {
        self.inner.bytes.load(Ordering::Acquire)
    }

    fn acquire(&self, bytes: usize) {
        self.inner.regions.fetch_add(1, Ordering::AcqRel);
        self.inner.bytes.fetch_add(bytes, Ordering::AcqRel);
    }

    fn release(&self, bytes: usize) {
        self.inner.regions.fetch_sub(1, Ordering::AcqRel);
        self.inner.bytes.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Allocator backed by host memory ([`SharedRegion`]) with an optional byte budget.
#[derive(Debug, Default)]
pub struct SystemAllocator {
    budget: Option<usize>,
    ledger: RegionLedger,
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator that refuses requests once `bytes` are live.
    pub fn with_budget(bytes: usize) -> Self {
        Self {
            budget: Some(bytes),
            ledger: RegionLedger::default(),
        }
    }

    /// Handle onto the live-region accounting.
    pub fn ledger(&self) -> RegionLedger {
        self.ledger.clone()
    }
}

impl RegionAllocator for SystemAllocator {
    fn allocate(&mut self, request: &RegionRequest) -> StoreResult<MappedRegion> {
        if request.size == 0 {
            return Err(StoreError::InvalidSize {
                name: request.debug_name.clone(),
                requested: 0,
                minimum: 1,
            });
        }

        if let Some(budget) = self.budget {
            let available = budget.saturating_sub(self.ledger.live_bytes());
            if request.size > available {
                return Err(StoreError::BudgetExhausted {
                    name: request.debug_name.clone(),
                    requested: request.size,
                    available,
                });
            }
        }

        let region =
            SharedRegion::new_aligned(&request.debug_name, request.size, request.alignment)?;
        debug!(
            "allocated region `{}` ({} bytes, {:?}, skip_sync={})",
            request.debug_name, request.size, request.access, request.skip_sync
        );
        Ok(MappedRegion::tracked(request, region, self.ledger.clone()))
    }
}
