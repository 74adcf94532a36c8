use crate::header::HEADER_SIZE;
use crate::list::BlockList;
use crate::{PoolError, PoolViolation};
use core::alloc::{GlobalAlloc, Layout};
use core::fmt;
use core::ptr::{self, NonNull};
use kernel_info::memory::POOL_MIN_ALIGN;
use kernel_info::region::{MemoryKind, RegionConfig};
use kernel_sync::SpinLock;
use log::{debug, info, warn};

/// How much of the block list an operation verifies.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IntegrityPolicy {
    /// Check the checksum of every header an operation reads.
    Touched,
    /// Additionally walk and verify the whole list after every allocate and
    /// free. `O(blocks)` per call; meant for tests and paranoid builds.
    Full,
}

impl Default for IntegrityPolicy {
    fn default() -> Self {
        if cfg!(feature = "paranoid") {
            Self::Full
        } else {
            Self::Touched
        }
    }
}

/// Byte accounting of a pool. `total()` always equals the arena size.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Blocks in the list, including the head.
    pub blocks: usize,
    /// Live allocations.
    pub allocations: usize,
    pub used: usize,
    pub reserved: usize,
    pub unused: usize,
    pub header_bytes: usize,
    /// Largest single unused tail. An upper bound for the next allocation.
    pub largest_unused: usize,
}

impl PoolStats {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.used + self.reserved + self.unused + self.header_bytes
    }
}

/// A fixed-arena heap for kernel objects.
///
/// All operations take the pool's spin lock; a pool can be shared freely
/// between processors.
pub struct Pool {
    kind: MemoryKind,
    policy: IntegrityPolicy,
    region: RegionConfig,
    blocks: SpinLock<BlockList>,
}

impl Pool {
    /// Take ownership of `[start, start + size)` and seed it with a single
    /// free block. A trailing remainder below the minimum alignment is left
    /// unused.
    ///
    /// # Safety
    /// - The memory range must be valid, writable, and exclusive to the pool
    ///   for as long as the pool or any allocation from it lives.
    ///
    /// # Errors
    /// [`PoolError::InvalidRegion`] if `start` is misaligned or the arena
    /// cannot hold a single header plus one minimal payload.
    pub unsafe fn from_raw_parts(
        kind: MemoryKind,
        start: NonNull<u8>,
        size: usize,
        policy: IntegrityPolicy,
    ) -> Result<Self, PoolError> {
        let base = start.as_ptr();
        let size = size - size % POOL_MIN_ALIGN;
        if !base.addr().is_multiple_of(POOL_MIN_ALIGN)
            || size < HEADER_SIZE + POOL_MIN_ALIGN
            || base.addr().checked_add(size).is_none()
        {
            return Err(PoolError::InvalidRegion {
                start: base.addr(),
                size,
            });
        }

        let blocks = unsafe { BlockList::init(base, size) };
        info!(
            "pool[{kind}]: {size:#x} bytes at {:#x}, {policy:?} verification",
            base.addr()
        );
        Ok(Self {
            kind,
            policy,
            region: RegionConfig::new(kind, base.addr(), size),
            blocks: SpinLock::named(kind.as_str(), blocks),
        })
    }

    /// [`from_raw_parts`](Self::from_raw_parts) over an identity-mapped
    /// region description.
    ///
    /// # Safety
    /// As for [`from_raw_parts`](Self::from_raw_parts); `area_start` must be
    /// directly addressable.
    ///
    /// # Errors
    /// [`PoolError::InvalidRegion`] as above, or for a null start.
    pub unsafe fn from_region(
        config: &RegionConfig,
        policy: IntegrityPolicy,
    ) -> Result<Self, PoolError> {
        let start = NonNull::new(ptr::with_exposed_provenance_mut::<u8>(config.area_start))
            .ok_or(PoolError::InvalidRegion {
                start: 0,
                size: config.area_size,
            })?;
        unsafe { Self::from_raw_parts(config.kind, start, config.area_size, policy) }
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> MemoryKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub const fn policy(&self) -> IntegrityPolicy {
        self.policy
    }

    /// The arena, after alignment trimming.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> RegionConfig {
        self.region
    }

    /// Whether `address` lies inside the arena.
    #[inline]
    #[must_use]
    pub const fn contains(&self, address: usize) -> bool {
        self.region.contains(address)
    }

    /// Allocate `size` bytes aligned to `alignment` (0 for the pool minimum
    /// of 16 bytes), tagged with `tag` for diagnostics.
    ///
    /// First fit over the address-ordered block list.
    ///
    /// # Errors
    /// [`PoolError::InvalidArgument`] for a zero size and
    /// [`PoolError::InvalidAlignment`] for an alignment with more than one bit
    /// set, both before the list is touched; [`PoolError::OutOfMemory`] if no
    /// block can hold the request.
    pub fn allocate(&self, size: usize, alignment: usize, tag: u32) -> Result<NonNull<u8>, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidArgument);
        }
        let align = match alignment {
            0 => POOL_MIN_ALIGN,
            a if a.is_power_of_two() => a.max(POOL_MIN_ALIGN),
            a => return Err(PoolError::InvalidAlignment(a)),
        };

        let mut blocks = self.blocks.lock_irq();
        let allocation = blocks.allocate(size, align, tag);
        self.verify_all(&blocks);
        drop(blocks);

        allocation.ok_or_else(|| {
            debug!("pool[{}]: out of memory for {size:#x}/{align:#x}", self.kind);
            PoolError::OutOfMemory { size, align }
        })
    }

    /// [`allocate`](Self::allocate), with the payload zeroed.
    ///
    /// # Errors
    /// As for [`allocate`](Self::allocate).
    pub fn allocate_zeroed(
        &self,
        size: usize,
        alignment: usize,
        tag: u32,
    ) -> Result<NonNull<u8>, PoolError> {
        let ptr = self.allocate(size, alignment, tag)?;
        // Safety: the allocation is exclusively ours and `size` bytes long.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(ptr)
    }

    /// Release an allocation, returning its payload size.
    ///
    /// # Errors
    /// [`PoolError::InvalidPointer`] if `ptr` is not the start of a live
    /// allocation of this pool (including a second free of the same pointer).
    pub fn free(&self, ptr: NonNull<u8>) -> Result<usize, PoolError> {
        let address = ptr.as_ptr().addr();
        let mut blocks = self.blocks.lock_irq();
        let freed = blocks.free(address);
        self.verify_all(&blocks);
        drop(blocks);

        freed.ok_or_else(|| {
            warn!("pool[{}]: free of unknown pointer {address:#x}", self.kind);
            PoolError::InvalidPointer(address)
        })
    }

    /// Whether `ptr` is the start of a live allocation.
    #[must_use]
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.blocks.lock_irq().owns(ptr.as_ptr().addr())
    }

    /// Requested size of the live allocation starting at `ptr`.
    #[must_use]
    pub fn allocation_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.blocks.lock_irq().allocation_size(ptr.as_ptr().addr())
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.blocks.lock_irq().stats()
    }

    /// Verify every header's checksum, the link structure, contiguity and
    /// byte conservation.
    ///
    /// # Errors
    /// The first defect found.
    pub fn check_invariants(&self) -> Result<(), PoolViolation> {
        self.blocks.lock_irq().check()
    }

    /// Log every block at debug level.
    pub fn dump(&self) {
        let blocks = self.blocks.lock_irq();
        debug!("pool[{}]: {}", self.kind, self.region);
        blocks.dump();
    }

    fn verify_all(&self, blocks: &BlockList) {
        if self.policy == IntegrityPolicy::Full
            && let Err(violation) = blocks.check()
        {
            log::error!("pool[{}]: {violation}", self.kind);
            panic!("pool[{}]: corrupted: {violation}", self.kind);
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("kind", &self.kind)
            .field("policy", &self.policy)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Tag used for allocations made through [`GlobalAlloc`].
pub const GLOBAL_ALLOC_TAG: u32 = crate::pool_tag(*b"Glbl");

unsafe impl GlobalAlloc for Pool {
    /// # Safety
    /// The `GlobalAlloc` contract applies. Caller must handle a null return (OOM).
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocate(layout.size().max(1), layout.align(), GLOBAL_ALLOC_TAG)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// # Safety
    /// The `GlobalAlloc` contract applies. `ptr` must come from this pool.
    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            // Unknown pointers are logged by `free`; there is nobody to report to.
            let _ = self.free(ptr);
        }
    }

    /// # Safety
    /// The `GlobalAlloc` contract applies.
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.allocate_zeroed(layout.size().max(1), layout.align(), GLOBAL_ALLOC_TAG)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}
