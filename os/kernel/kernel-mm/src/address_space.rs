use crate::MemoryError;
use kernel_info::memory::{SIZE_BUCKETS, page_round_down, page_round_up};
use kernel_info::region::{MemoryKind, RegionConfig};
use kernel_sync::SpinLock;
use kernel_xad::{Extent, ExtentQuery, ExtentRange, ExtentType, ExtentViolation, XadTree};
use log::{debug, info, warn};

/// One extent tree behind its lock: the physical space or the kernel's
/// virtual range.
pub struct AddressSpace {
    kind: MemoryKind,
    tree: SpinLock<XadTree>,
}

impl AddressSpace {
    /// # Errors
    /// [`MemoryError::InvalidConfig`] if the region is empty or wraps.
    pub fn new(config: &RegionConfig) -> Result<Self, MemoryError> {
        let kind = config.kind;
        let tree = XadTree::from_region(kind.as_str(), config)
            .map_err(|_| MemoryError::InvalidConfig { kind })?;
        info!("mm: {kind} address space {}", tree.region());
        Ok(Self {
            kind,
            tree: SpinLock::named(kind.as_str(), tree),
        })
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> MemoryKind {
        self.kind
    }

    /// The tracked region.
    #[must_use]
    pub fn region(&self) -> ExtentRange {
        self.tree.lock().region()
    }

    /// Reserve `size` bytes (rounded up to pages) as `ty` and return the
    /// start address.
    ///
    /// A `hint` inside a free extent that can hold the whole request pins
    /// the placement to the page containing it; otherwise (or without a hint)
    /// the smallest size bucket with a fitting free extent is used.
    ///
    /// # Errors
    /// [`MemoryError::InvalidArgument`] for a zero size or `ty == FREE`,
    /// [`MemoryError::NotFound`] if no free extent is large enough.
    pub fn allocate(
        &self,
        hint: Option<u64>,
        size: u64,
        ty: ExtentType,
    ) -> Result<u64, MemoryError> {
        let size = Self::pages(size, ty)?;
        let mut tree = self.tree.lock();

        let placed = hint.map(page_round_down).and_then(|start| {
            tree.lookup(&ExtentQuery::at(start).size(size).of_type(ExtentType::FREE))
                .ok()
                .map(|id| (id, start))
        });
        let (target, start) = match placed {
            Some(placed) => placed,
            None => {
                let id = tree.lookup(&ExtentQuery::with_size(size))?;
                let start = tree.get(id).map_or(0, Extent::start);
                (id, start)
            }
        };

        let range = ExtentRange::from_len(start, size)?;
        tree.reclaim(target, range, ty, Some(ExtentType::FREE))?;
        debug!("mm: {} allocate {range} as {ty}", self.kind);
        Ok(start)
    }

    /// Reserve exactly `[start, start + size)` (rounded out to pages) as `ty`.
    ///
    /// # Errors
    /// [`MemoryError::NotFound`] unless the whole range lies in one free
    /// extent.
    pub fn reserve(&self, start: u64, size: u64, ty: ExtentType) -> Result<(), MemoryError> {
        let first = page_round_down(start);
        let last = start
            .checked_add(size)
            .and_then(page_round_up)
            .ok_or(MemoryError::InvalidArgument)?;
        let size = Self::pages(last - first, ty)?;

        let mut tree = self.tree.lock();
        let target = tree.lookup(&ExtentQuery::at(first).size(size).of_type(ExtentType::FREE))?;
        let range = ExtentRange::from_len(first, size)?;
        tree.reclaim(target, range, ty, Some(ExtentType::FREE))?;
        debug!("mm: {} reserve {range} as {ty}", self.kind);
        Ok(())
    }

    /// Return a range to the type it had before it was allocated.
    ///
    /// Without a size the whole extent containing `address` is released;
    /// with one, `[address, address + size)` is rounded out to pages as in
    /// [`reserve`](Self::reserve). Adjacent allocations of the same type share an extent, so callers
    /// that make several of them should pass the size. Returns the number of
    /// bytes released.
    ///
    /// # Errors
    /// [`MemoryError::NotFound`] if the address is not tracked,
    /// [`MemoryError::NotAllocated`] if it is free, and
    /// [`MemoryError::InvalidRange`] if the range leaves the extent.
    pub fn free(&self, address: u64, size: Option<u64>) -> Result<u64, MemoryError> {
        let mut tree = self.tree.lock();
        let target = tree.find(address).ok_or(MemoryError::NotFound)?;
        let (whole, ty, previous) = match tree.get(target) {
            Some(e) => (e.range(), e.ty(), e.previous_type()),
            None => return Err(MemoryError::NotFound),
        };
        if ty.is_free() || ty == previous {
            warn!("mm: {} free of unallocated {address:#x}", self.kind);
            return Err(MemoryError::NotAllocated(address));
        }

        let range = match size {
            None => whole,
            Some(size) => {
                let end = address
                    .checked_add(size)
                    .and_then(page_round_up)
                    .ok_or(MemoryError::InvalidArgument)?;
                ExtentRange::new(page_round_down(address), end)?
            }
        };
        tree.reclaim(target, range, previous, Some(ty))?;
        debug!("mm: {} free {range} {ty} -> {previous}", self.kind);
        Ok(range.len())
    }

    /// Cover `size` bytes with as many free extents as needed, largest first,
    /// writing the pieces to `pieces` and retyping them to `ty`. Only the last
    /// piece is cut to size. Returns the number of pieces used.
    ///
    /// Nothing changes unless the whole request can be described in `pieces`.
    ///
    /// # Errors
    /// [`MemoryError::InsufficientMemory`] if the region has less free space
    /// than requested, [`MemoryError::BufferTooSmall`] if `pieces` runs out
    /// first.
    pub fn allocate_gather(
        &self,
        size: u64,
        ty: ExtentType,
        pieces: &mut [ExtentRange],
    ) -> Result<usize, MemoryError> {
        let size = Self::pages(size, ty)?;
        let mut tree = self.tree.lock();

        let available = tree.bytes_of_type(ExtentType::FREE);
        if available < size {
            debug!(
                "mm: {} gather of {size:#x} with {available:#x} free",
                self.kind
            );
            return Err(MemoryError::InsufficientMemory {
                requested: size,
                available,
            });
        }

        let mut count = 0;
        let mut remaining = size;
        'buckets: for bucket in (0..SIZE_BUCKETS).rev() {
            for (_, extent) in tree.bucket(bucket) {
                if remaining == 0 {
                    break 'buckets;
                }
                let Some(slot) = pieces.get_mut(count) else {
                    return Err(MemoryError::BufferTooSmall {
                        capacity: pieces.len(),
                    });
                };
                let take = remaining.min(extent.len());
                *slot = ExtentRange::from_len(extent.start(), take)?;
                count += 1;
                remaining -= take;
            }
        }

        // The pieces sit in distinct free extents; retyping one only merges
        // it with neighbors of `ty`, so every other piece still resolves.
        for piece in &pieces[..count] {
            if let Err(e) = tree.reclaim_at(*piece, ty, Some(ExtentType::FREE)) {
                log::error!("mm: {} gather piece {piece} vanished: {e}", self.kind);
                panic!("mm: {} gather piece {piece} vanished: {e}", self.kind);
            }
        }
        debug!(
            "mm: {} gathered {size:#x} bytes in {count} piece(s) as {ty}",
            self.kind
        );
        Ok(count)
    }

    /// Release every piece of a gather allocation. All pieces are checked
    /// before the first one is freed.
    ///
    /// # Errors
    /// [`MemoryError::InvalidRange`] for overlapping pieces or pieces that
    /// leave their extent, [`MemoryError::NotAllocated`] if a piece lies in
    /// free space, [`MemoryError::NotFound`] if it is not tracked.
    pub fn free_gather(&self, pieces: &[ExtentRange]) -> Result<(), MemoryError> {
        for (i, a) in pieces.iter().enumerate() {
            if pieces[i + 1..].iter().any(|b| a.overlaps(b)) {
                return Err(MemoryError::InvalidRange {
                    start: a.start(),
                    end: a.end(),
                });
            }
        }

        let mut tree = self.tree.lock();
        for piece in pieces {
            let extent = tree
                .find(piece.start())
                .and_then(|id| tree.get(id))
                .ok_or(MemoryError::NotFound)?;
            if extent.ty().is_free() || extent.ty() == extent.previous_type() {
                return Err(MemoryError::NotAllocated(piece.start()));
            }
            if !extent.range().contains_range(piece) {
                return Err(MemoryError::InvalidRange {
                    start: piece.start(),
                    end: piece.end(),
                });
            }
        }

        for piece in pieces {
            let (ty, previous) = match tree.find(piece.start()).and_then(|id| tree.get(id)) {
                Some(e) => (e.ty(), e.previous_type()),
                None => return Err(MemoryError::NotFound),
            };
            tree.reclaim_at(*piece, previous, Some(ty))?;
        }
        debug!("mm: {} released {} gathered piece(s)", self.kind, pieces.len());
        Ok(())
    }

    /// Snapshot of the extent containing `address`.
    #[must_use]
    pub fn query(&self, address: u64) -> Option<Extent> {
        let tree = self.tree.lock();
        tree.find(address).and_then(|id| tree.get(id)).cloned()
    }

    /// Total bytes currently of type `ty`.
    #[must_use]
    pub fn bytes_of_type(&self, ty: ExtentType) -> u64 {
        self.tree.lock().bytes_of_type(ty)
    }

    /// Size of the largest free extent, or 0.
    #[must_use]
    pub fn largest_free(&self) -> u64 {
        let tree = self.tree.lock();
        tree.largest_extent_of_type(ExtentType::FREE)
            .and_then(|id| tree.get(id))
            .map_or(0, Extent::len)
    }

    /// Every extent in address order.
    pub fn for_each_extent(&self, mut f: impl FnMut(&Extent)) {
        let tree = self.tree.lock();
        for (_, extent) in tree.extents() {
            f(extent);
        }
    }

    /// # Errors
    /// The first defect in the underlying extent tree.
    pub fn check_invariants(&self) -> Result<(), ExtentViolation> {
        self.tree.lock().check_invariants()
    }

    pub fn dump(&self) {
        self.tree.lock().dump();
    }

    /// Validate an allocation request and round it to pages.
    fn pages(size: u64, ty: ExtentType) -> Result<u64, MemoryError> {
        if size == 0 || ty.is_free() {
            return Err(MemoryError::InvalidArgument);
        }
        page_round_up(size).ok_or(MemoryError::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::PAGE_SIZE;

    fn space() -> AddressSpace {
        AddressSpace::new(&RegionConfig::new(MemoryKind::Physical, 0x10_0000, 0x10_0000)).unwrap()
    }

    #[test]
    fn sizes_round_up_to_pages() {
        let space = space();
        let a = space.allocate(None, 1, ExtentType::IN_USE).unwrap();
        let b = space.allocate(None, PAGE_SIZE + 1, ExtentType::IN_USE).unwrap();
        assert_eq!(space.bytes_of_type(ExtentType::IN_USE), 3 * PAGE_SIZE);
        assert_ne!(a, b);
        space.check_invariants().unwrap();
    }

    #[test]
    fn hints_are_preferences() {
        let space = space();
        let at = space
            .allocate(Some(0x18_0123), PAGE_SIZE, ExtentType::IN_USE)
            .unwrap();
        assert_eq!(at, 0x18_0000);

        // Taken: falls back to a size lookup.
        let elsewhere = space
            .allocate(Some(0x18_0000), PAGE_SIZE, ExtentType::IN_USE)
            .unwrap();
        assert_ne!(elsewhere, 0x18_0000);

        // Outside the region: same.
        assert!(space.allocate(Some(0x1000), PAGE_SIZE, ExtentType::IN_USE).is_ok());
        space.check_invariants().unwrap();
    }

    #[test]
    fn bad_requests() {
        let space = space();
        assert_eq!(
            space.allocate(None, 0, ExtentType::IN_USE),
            Err(MemoryError::InvalidArgument)
        );
        assert_eq!(
            space.allocate(None, PAGE_SIZE, ExtentType::FREE),
            Err(MemoryError::InvalidArgument)
        );
        assert_eq!(
            space.allocate(None, 0x20_0000, ExtentType::IN_USE),
            Err(MemoryError::NotFound)
        );
        assert_eq!(space.free(0x10_0000, None), Err(MemoryError::NotAllocated(0x10_0000)));
        assert_eq!(space.free(0, None), Err(MemoryError::NotFound));
    }

    #[test]
    fn reserve_is_exact() {
        let space = space();
        space.reserve(0x10_0800, 0x1000, ExtentType::RESERVED).unwrap();
        let e = space.query(0x10_1000).unwrap();
        assert_eq!(e.range(), ExtentRange::new(0x10_0000, 0x10_2000).unwrap());
        assert_eq!(
            space.reserve(0x10_1000, 0x1000, ExtentType::RESERVED),
            Err(MemoryError::NotFound)
        );
    }

    #[test]
    fn unaligned_reserve_frees_what_it_took() {
        let space = space();
        space.reserve(0x10_0800, 0x1000, ExtentType::RESERVED).unwrap();
        assert_eq!(space.bytes_of_type(ExtentType::RESERVED), 2 * PAGE_SIZE);

        // Same arguments back: both straddled pages are released.
        assert_eq!(space.free(0x10_0800, Some(0x1000)), Ok(2 * PAGE_SIZE));
        assert_eq!(space.bytes_of_type(ExtentType::RESERVED), 0);
        assert_eq!(space.bytes_of_type(ExtentType::FREE), 0x10_0000);
        space.check_invariants().unwrap();

        // An unaligned sub-range inside one page still frees that page.
        let at = space.allocate(None, 4 * PAGE_SIZE, ExtentType::IN_USE).unwrap();
        assert_eq!(space.free(at + PAGE_SIZE + 0x10, Some(0x20)), Ok(PAGE_SIZE));
        assert_eq!(space.bytes_of_type(ExtentType::IN_USE), 3 * PAGE_SIZE);
        assert_eq!(
            space.free(at + 0x800, Some(u64::MAX)),
            Err(MemoryError::InvalidArgument)
        );
        space.check_invariants().unwrap();
    }
}
