use crate::{AddressSpace, MemoryConfig, MemoryError};
use core::ptr::NonNull;
use kernel_info::region::MemoryKind;
use kernel_pool::{Pool, PoolError};
use kernel_sync::SyncOnceCell;
use kernel_xad::{Extent, ExtentRange, ExtentType, ExtentViolation};
use log::{debug, info};

static GLOBAL: SyncOnceCell<MemoryManager> = SyncOnceCell::new();

/// The memory instances of one kernel: both address spaces and the pools.
///
/// Every instance carries its own lock; there is no ordering between them.
pub struct MemoryManager {
    virtual_space: AddressSpace,
    physical_space: AddressSpace,
    pools: [Option<Pool>; 2],
}

impl MemoryManager {
    /// Create both address spaces. Pools are attached separately, see
    /// [`add_pool`](Self::add_pool) and [`with_pools`](Self::with_pools).
    ///
    /// # Errors
    /// [`MemoryError::InvalidConfig`] if the configuration does not validate.
    pub fn new(config: &MemoryConfig) -> Result<Self, MemoryError> {
        config.validate()?;
        Ok(Self {
            virtual_space: AddressSpace::new(&config.virtual_space)?,
            physical_space: AddressSpace::new(&config.physical_space)?,
            pools: [None, None],
        })
    }

    /// [`new`](Self::new), then build and attach every configured pool.
    ///
    /// # Safety
    /// Each configured pool region must be directly addressable, writable
    /// and owned exclusively by the resulting manager.
    ///
    /// # Errors
    /// As for [`new`](Self::new) and [`add_pool`](Self::add_pool), or a
    /// [`PoolError`] for an unusable pool arena.
    pub unsafe fn with_pools(config: &MemoryConfig) -> Result<Self, MemoryError> {
        let mut manager = Self::new(config)?;
        for region in [config.non_paged_pool, config.paged_pool].into_iter().flatten() {
            let pool = unsafe { Pool::from_region(&region, config.pool_integrity) }?;
            manager.add_pool(pool)?;
        }
        Ok(manager)
    }

    /// Attach a pool. If its arena lies in the virtual address space the
    /// range is reserved there as [`ExtentType::POOL`].
    ///
    /// # Errors
    /// [`MemoryError::PoolExists`] if a pool of the same kind is attached,
    /// [`MemoryError::InvalidConfig`] for a non-pool kind, or the reservation
    /// error if the arena overlaps a range already in use.
    pub fn add_pool(&mut self, pool: Pool) -> Result<(), MemoryError> {
        let kind = pool.kind();
        if !kind.is_pool() {
            return Err(MemoryError::InvalidConfig { kind });
        }
        if self.pools[kind.index()].is_some() {
            return Err(MemoryError::PoolExists(kind));
        }

        let region = pool.region();
        let arena = ExtentRange::from_len(region.area_start as u64, region.area_size as u64)?;
        if self.virtual_space.region().contains_range(&arena) {
            self.virtual_space
                .reserve(arena.start(), arena.len(), ExtentType::POOL)?;
        }

        info!("mm: attached {kind} pool {region}");
        self.pools[kind.index()] = Some(pool);
        Ok(())
    }

    /// The pool of `kind`, if attached.
    #[must_use]
    pub fn pool(&self, kind: MemoryKind) -> Option<&Pool> {
        if kind.is_pool() {
            self.pools[kind.index()].as_ref()
        } else {
            None
        }
    }

    /// # Errors
    /// [`MemoryError::NoPool`] if no pool of `kind` is attached, otherwise
    /// the pool's own error.
    pub fn pool_allocate(
        &self,
        kind: MemoryKind,
        size: usize,
        alignment: usize,
        tag: u32,
    ) -> Result<NonNull<u8>, MemoryError> {
        let pool = self.pool(kind).ok_or(MemoryError::NoPool(kind))?;
        Ok(pool.allocate(size, alignment, tag)?)
    }

    /// Return an object to whichever pool's arena contains it. Returns the
    /// size it was allocated with.
    ///
    /// # Errors
    /// [`PoolError::InvalidPointer`] if no pool contains the pointer or the
    /// owning pool did not hand it out.
    pub fn pool_free(&self, ptr: NonNull<u8>) -> Result<usize, MemoryError> {
        let address = ptr.as_ptr().addr();
        let pool = self
            .pools
            .iter()
            .flatten()
            .find(|pool| pool.contains(address))
            .ok_or(PoolError::InvalidPointer(address))?;
        Ok(pool.free(ptr)?)
    }

    #[inline]
    #[must_use]
    pub const fn virtual_space(&self) -> &AddressSpace {
        &self.virtual_space
    }

    #[inline]
    #[must_use]
    pub const fn physical_space(&self) -> &AddressSpace {
        &self.physical_space
    }

    /// See [`AddressSpace::allocate`].
    ///
    /// # Errors
    /// As for [`AddressSpace::allocate`].
    pub fn allocate_virtual(
        &self,
        hint: Option<u64>,
        size: u64,
        ty: ExtentType,
    ) -> Result<u64, MemoryError> {
        self.virtual_space.allocate(hint, size, ty)
    }

    /// See [`AddressSpace::allocate`].
    ///
    /// # Errors
    /// As for [`AddressSpace::allocate`].
    pub fn allocate_physical(
        &self,
        hint: Option<u64>,
        size: u64,
        ty: ExtentType,
    ) -> Result<u64, MemoryError> {
        self.physical_space.allocate(hint, size, ty)
    }

    /// # Errors
    /// As for [`AddressSpace::reserve`].
    pub fn reserve_virtual(&self, start: u64, size: u64, ty: ExtentType) -> Result<(), MemoryError> {
        self.virtual_space.reserve(start, size, ty)
    }

    /// # Errors
    /// As for [`AddressSpace::reserve`].
    pub fn reserve_physical(
        &self,
        start: u64,
        size: u64,
        ty: ExtentType,
    ) -> Result<(), MemoryError> {
        self.physical_space.reserve(start, size, ty)
    }

    /// # Errors
    /// As for [`AddressSpace::free`].
    pub fn free_virtual(&self, address: u64, size: Option<u64>) -> Result<u64, MemoryError> {
        self.virtual_space.free(address, size)
    }

    /// # Errors
    /// As for [`AddressSpace::free`].
    pub fn free_physical(&self, address: u64, size: Option<u64>) -> Result<u64, MemoryError> {
        self.physical_space.free(address, size)
    }

    /// Physical memory in as many pieces as it takes, for callers that can
    /// map discontiguous frames. See [`AddressSpace::allocate_gather`].
    ///
    /// # Errors
    /// As for [`AddressSpace::allocate_gather`].
    pub fn allocate_physical_gather(
        &self,
        size: u64,
        ty: ExtentType,
        pieces: &mut [ExtentRange],
    ) -> Result<usize, MemoryError> {
        self.physical_space.allocate_gather(size, ty, pieces)
    }

    /// # Errors
    /// As for [`AddressSpace::free_gather`].
    pub fn free_physical_gather(&self, pieces: &[ExtentRange]) -> Result<(), MemoryError> {
        self.physical_space.free_gather(pieces)
    }

    #[must_use]
    pub fn query_virtual(&self, address: u64) -> Option<Extent> {
        self.virtual_space.query(address)
    }

    #[must_use]
    pub fn query_physical(&self, address: u64) -> Option<Extent> {
        self.physical_space.query(address)
    }

    /// Verify both extent trees and every pool.
    ///
    /// # Panics
    /// If a pool fails its check; pool defects are corruption.
    ///
    /// # Errors
    /// The first extent tree defect found.
    pub fn check_invariants(&self) -> Result<(), ExtentViolation> {
        self.virtual_space.check_invariants()?;
        self.physical_space.check_invariants()?;
        for pool in self.pools.iter().flatten() {
            if let Err(violation) = pool.check_invariants() {
                log::error!("mm: {} pool corrupted: {violation}", pool.kind());
                panic!("mm: {} pool corrupted: {violation}", pool.kind());
            }
        }
        Ok(())
    }

    pub fn dump(&self) {
        debug!("mm: virtual space");
        self.virtual_space.dump();
        debug!("mm: physical space");
        self.physical_space.dump();
        for pool in self.pools.iter().flatten() {
            debug!("mm: {} pool", pool.kind());
            pool.dump();
        }
    }

    /// Make this manager reachable through [`global`].
    ///
    /// # Errors
    /// [`MemoryError::AlreadyInstalled`] on every call after the first; the
    /// rejected manager is dropped.
    pub fn install(self) -> Result<&'static Self, MemoryError> {
        GLOBAL.set(self).map_err(|_| MemoryError::AlreadyInstalled)?;
        info!("mm: memory manager installed");
        GLOBAL.get().ok_or(MemoryError::AlreadyInstalled)
    }
}

/// The installed memory manager, if any.
#[must_use]
pub fn global() -> Option<&'static MemoryManager> {
    GLOBAL.get()
}

