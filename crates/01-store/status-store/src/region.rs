//! Memory mapping helpers for hardware status records.
//!
//! Status records live in fixed-size regions that a device writes and the host
//! reads. On native targets the backing comes from anonymous `mmap` pages;
//! elsewhere (or when the mapping is misaligned) we fall back to aligned heap
//! allocations. The unsafe surface stays inside this module.

use crate::{StoreError, StoreResult};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::mem::size_of;
use std::ptr::{self, NonNull};

#[cfg(not(target_arch = "wasm32"))]
type NativeMap = memmap2::MmapMut;

#[derive(Debug)]
enum Backing {
    #[cfg(not(target_arch = "wasm32"))]
    Native(NativeMap),
    Owned {
        ptr: NonNull<u8>,
        layout: Layout,
    },
}

impl Backing {
    fn as_mut_ptr(&mut self) -> *mut u8 {
        match self {
            #[cfg(not(target_arch = "wasm32"))]
            Backing::Native(map) => map.as_mut_ptr(),
            Backing::Owned { ptr, .. } => ptr.as_ptr(),
        }
    }

    fn as_ptr(&self) -> *const u8 {
        match self {
            #[cfg(not(target_arch = "wasm32"))]
            Backing::Native(map) => map.as_ptr(),
            Backing::Owned { ptr, .. } => ptr.as_ptr(),
        }
    }
}

/// Contiguous, aligned backing memory for status records.
///
/// All word accessors are volatile: the contents may change underneath the
/// host at any time because a device writes into the same pages.
#[derive(Debug)]
pub struct SharedRegion {
    len: usize,
    alignment: usize,
    backing: Backing,
}

// SAFETY: the region exclusively owns its mapping or heap block; moving it to
// another thread moves that ownership with it.
unsafe impl Send for SharedRegion {}

impl SharedRegion {
    /// Allocates a zeroed region of `len` bytes aligned to `alignment`.
    ///
    /// Regions always start zeroed so no record reads as complete before a
    /// device wrote it. `name` is only used for error reporting.
    pub fn new_aligned(name: &str, len: usize, alignment: usize) -> StoreResult<Self> {
        if len == 0 || alignment == 0 || !alignment.is_power_of_two() {
            return Err(StoreError::AllocationFailed {
                name: name.to_owned(),
                size: len,
                alignment,
            });
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Some(backing) = Self::mmap_backed(name, len, alignment)? {
                return Ok(Self {
                    len,
                    alignment,
                    backing,
                });
            }
        }

        Self::heap_backed(name, len, alignment)
    }

    fn heap_backed(name: &str, len: usize, alignment: usize) -> StoreResult<Self> {
        let failed = || StoreError::AllocationFailed {
            name: name.to_owned(),
            size: len,
            alignment,
        };
        let layout = Layout::from_size_align(len, alignment).map_err(|_| failed())?;

        // SAFETY: `layout` has a non-zero size (checked in `new_aligned`).
        let ptr = unsafe { alloc_zeroed(layout) };

        let ptr = NonNull::new(ptr).ok_or_else(failed)?;
        Ok(Self {
            len,
            alignment,
            backing: Backing::Owned { ptr, layout },
        })
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn mmap_backed(name: &str, len: usize, alignment: usize) -> StoreResult<Option<Backing>> {
        let map = memmap2::MmapOptions::new()
            .len(len)
            .map_anon()
            .map_err(|_| StoreError::AllocationFailed {
                name: name.to_owned(),
                size: len,
                alignment,
            })?;

        // Anonymous mappings are zero-filled by the kernel.
        if map.as_ptr() as usize % alignment != 0 {
            return Ok(None);
        }
        Ok(Some(Backing::Native(map)))
    }

    /// Total number of bytes managed by this region.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the region has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the alignment the region was allocated with.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Borrow the region as a const pointer.
    pub fn as_ptr(&self) -> *const u8 {
        self.backing.as_ptr()
    }

    /// Borrow the region as a mut pointer.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.backing.as_mut_ptr()
    }

    /// View the full region as an immutable slice.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the backing holds `len` initialised bytes for the lifetime
        // of `self`.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    /// Volatile 32-bit load at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the word does not fit inside the region.
    pub fn read_u32(&self, offset: usize) -> u32 {
        self.check_word::<u32>(offset);
        // SAFETY: bounds checked above; offsets are word aligned relative to a
        // region whose base alignment is at least the word size.
        unsafe { ptr::read_volatile(self.as_ptr().add(offset) as *const u32) }
    }

    /// Volatile 64-bit load at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the word does not fit inside the region.
    pub fn read_u64(&self, offset: usize) -> u64 {
        self.check_word::<u64>(offset);
        // SAFETY: see `read_u32`.
        unsafe { ptr::read_volatile(self.as_ptr().add(offset) as *const u64) }
    }

    /// Volatile 32-bit store at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the word does not fit inside the region.
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.check_word::<u32>(offset);
        // SAFETY: see `read_u32`.
        unsafe { ptr::write_volatile(self.as_mut_ptr().add(offset) as *mut u32, value) }
    }

    /// Volatile 64-bit store at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the word does not fit inside the region.
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.check_word::<u64>(offset);
        // SAFETY: see `read_u32`.
        unsafe { ptr::write_volatile(self.as_mut_ptr().add(offset) as *mut u64, value) }
    }

    /// Overwrites `len` bytes starting at `offset` with `byte`.
    ///
    /// # Panics
    ///
    /// Panics if the range does not fit inside the region.
    pub fn fill(&mut self, offset: usize, len: usize, byte: u8) {
        let end = offset.checked_add(len).filter(|end| *end <= self.len);
        assert!(
            end.is_some(),
            "fill {offset}+{len} out of range for region of {} bytes",
            self.len
        );
        // SAFETY: range validated above.
        unsafe { ptr::write_bytes(self.as_mut_ptr().add(offset), byte, len) }
    }

    fn check_word<T>(&self, offset: usize) {
        let width = size_of::<T>();
        assert!(
            offset.checked_add(width).is_some_and(|end| end <= self.len),
            "word at {offset} out of range for region of {} bytes",
            self.len
        );
        debug_assert!(
            offset % width == 0 && width <= self.alignment,
            "unaligned word access at {offset}"
        );
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Backing::Owned { ptr, layout } = &self.backing {
            unsafe {
                dealloc(ptr.as_ptr(), *layout);
            }
        }
    }
}
