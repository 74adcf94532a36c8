use crate::header::{BlockHeader, BlockInfo, HEAD_TAG, HEADER_SIZE};
use crate::{PoolStats, PoolViolation};
use core::ptr::{self, NonNull, null_mut};
use kernel_info::memory::POOL_MIN_ALIGN;
use log::debug;

/// Address-ordered list of block headers over one arena.
///
/// # Invariants
/// - `head` is the first block, at the arena base, and is never unlinked.
/// - Every block ends exactly where the next one starts; the last one ends
///   at the arena end.
/// - Every header at rest carries a valid checksum.
pub(crate) struct BlockList {
    base: *mut u8,
    size: usize,
    head: *mut BlockHeader,
}

// Safety: The list is only reachable through the pool's SpinLock; raw pointers
// are only dereferenced while it is held.
unsafe impl Send for BlockList {}

#[inline]
const fn align_up(addr: usize, align: usize) -> Option<usize> {
    match addr.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

impl BlockList {
    /// Seed `[base, base + size)` with a single head block whose unused tail
    /// spans the rest of the arena.
    ///
    /// # Safety
    /// - The range must be valid, writable, and exclusive to this list for its
    ///   whole lifetime.
    /// - `base` must be aligned to `POOL_MIN_ALIGN` and `size` must be a
    ///   multiple of it, no smaller than `HEADER_SIZE`.
    pub(crate) unsafe fn init(base: *mut u8, size: usize) -> Self {
        debug_assert!(base.addr().is_multiple_of(POOL_MIN_ALIGN));
        debug_assert!(size >= HEADER_SIZE && size.is_multiple_of(POOL_MIN_ALIGN));

        let head = base.cast::<BlockHeader>();
        unsafe {
            ptr::write_bytes(base, 0, size);
            head.write(BlockHeader {
                tag: HEAD_TAG,
                checksum: 0,
                info: BlockInfo::new().with_head(true),
                prev: null_mut(),
                next: null_mut(),
                used: 0,
                reserved: 0,
                unused: size - HEADER_SIZE,
            });
            (*head).seal();
        }
        Self { base, size, head }
    }

    #[inline]
    pub(crate) fn start(&self) -> usize {
        self.base.addr()
    }

    #[inline]
    pub(crate) fn end(&self) -> usize {
        self.start() + self.size
    }

    #[inline]
    fn at<T>(&self, addr: usize) -> *mut T {
        self.base.with_addr(addr).cast()
    }

    /// Shared view of a header after checking its checksum.
    ///
    /// # Safety
    /// `header` must point at a header linked into this list.
    unsafe fn verified<'a>(&self, header: *const BlockHeader) -> &'a BlockHeader {
        let h = unsafe { &*header };
        if !h.is_intact() {
            corrupted(h);
        }
        h
    }

    /// First-fit: carve a block out of the first unused tail that can hold
    /// `size` bytes at `align`.
    pub(crate) fn allocate(&mut self, size: usize, align: usize, tag: u32) -> Option<NonNull<u8>> {
        let padded = size.checked_next_multiple_of(POOL_MIN_ALIGN)?;
        let mut current = self.head;

        while !current.is_null() {
            let (tail, end, next) = {
                let block = unsafe { self.verified(current) };
                (block.tail_start(), block.end(), block.next)
            };

            let start = tail
                .checked_add(HEADER_SIZE)
                .and_then(|a| align_up(a, align));
            let stop = start.and_then(|s| s.checked_add(padded));
            if let (Some(start), Some(stop)) = (start, stop)
                && stop <= end
            {
                let block = self.at::<BlockHeader>(start - HEADER_SIZE);
                #[allow(clippy::cast_possible_truncation)]
                let info = BlockInfo::new().with_align_shift(align.trailing_zeros() as u8);
                unsafe {
                    block.write(BlockHeader {
                        tag,
                        checksum: 0,
                        info,
                        prev: current,
                        next,
                        used: size,
                        reserved: padded - size,
                        unused: end - stop,
                    });
                    (*block).seal();

                    (*current).next = block;
                    (*current).unused = block.addr() - tail;
                    (*current).seal();

                    if !next.is_null() {
                        self.verified(next);
                        (*next).prev = block;
                        (*next).seal();
                    }
                }

                debug!(
                    "pool: allocated {size:#x} bytes at {start:#x} (align {align:#x}, donor {:#x})",
                    current.addr()
                );
                return NonNull::new(self.at::<u8>(start));
            }
            current = next;
        }
        None
    }

    /// Release the allocation whose payload starts at `payload`.
    ///
    /// The target and any free blocks around it are unlinked and zeroed; their
    /// space joins the unused tail of the nearest earlier allocated block (or
    /// the head). Returns the payload size released, or `None` if `payload`
    /// is not a live allocation.
    pub(crate) fn free(&mut self, payload: usize) -> Option<usize> {
        let target = self.find(payload)?;

        let (freed, mut first, mut after) = {
            let block = unsafe { self.verified(target) };
            (block.used, block.prev, block.next)
        };

        // Nearest earlier survivor: an allocated block, or the head.
        loop {
            let block = unsafe { self.verified(first) };
            if block.is_head() || !block.is_free() {
                break;
            }
            first = block.prev;
        }
        // Nearest later survivor: an allocated block, or the arena end.
        while !after.is_null() {
            let block = unsafe { self.verified(after) };
            if !block.is_free() {
                break;
            }
            after = block.next;
        }

        let tail = unsafe { (*first).tail_start() };
        let end = if after.is_null() {
            self.end()
        } else {
            after.addr()
        };

        unsafe {
            ptr::write_bytes(self.at::<u8>(tail), 0, end - tail);
            (*first).unused = end - tail;
            (*first).next = after;
            (*first).seal();
            if !after.is_null() {
                (*after).prev = first;
                (*after).seal();
            }
        }

        debug!(
            "pool: freed {freed:#x} bytes at {payload:#x}, {:#x} bytes now follow {:#x}",
            end - tail,
            first.addr()
        );
        Some(freed)
    }

    /// Header of the live allocation whose payload starts at `payload`.
    fn find(&self, payload: usize) -> Option<*mut BlockHeader> {
        let wanted = payload.checked_sub(HEADER_SIZE)?;
        if wanted < self.start() || payload >= self.end() {
            return None;
        }

        let mut current = self.head;
        while !current.is_null() {
            let block = unsafe { self.verified(current) };
            let addr = block.address();
            if addr == wanted {
                return (!block.is_head() && !block.is_free()).then_some(current);
            }
            if addr > wanted {
                return None;
            }
            current = block.next;
        }
        None
    }

    /// Whether `payload` is the start of a live allocation.
    pub(crate) fn owns(&self, payload: usize) -> bool {
        self.find(payload).is_some()
    }

    /// Payload size of the live allocation starting at `payload`.
    pub(crate) fn allocation_size(&self, payload: usize) -> Option<usize> {
        self.find(payload)
            .map(|h| unsafe { self.verified(h) }.used)
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        self.for_each(|block| {
            stats.blocks += 1;
            if !block.is_head() {
                stats.allocations += 1;
            }
            stats.used += block.used;
            stats.reserved += block.reserved;
            stats.unused += block.unused;
            stats.header_bytes += HEADER_SIZE;
            stats.largest_unused = stats.largest_unused.max(block.unused);
        });
        stats
    }

    /// Walk every block, verifying its checksum first.
    fn for_each(&self, mut f: impl FnMut(&BlockHeader)) {
        let mut current = self.head;
        while !current.is_null() {
            let block = unsafe { self.verified(current) };
            f(block);
            current = block.next;
        }
    }

    /// Checksums, link symmetry, contiguity and conservation, without panicking.
    pub(crate) fn check(&self) -> Result<(), PoolViolation> {
        let mut current = self.head;
        let mut prev: *mut BlockHeader = null_mut();
        let mut expected_addr = self.start();
        let mut accounted = 0usize;

        while !current.is_null() {
            let addr = current.addr();
            if addr < self.start() || addr + HEADER_SIZE > self.end() {
                return Err(PoolViolation::OutOfBounds { header: addr });
            }
            let block = unsafe { &*current };
            if !block.is_intact() {
                return Err(PoolViolation::ChecksumMismatch {
                    header: addr,
                    stored: block.checksum,
                    computed: block.compute_checksum(),
                });
            }
            if block.prev != prev {
                return Err(PoolViolation::BrokenLink {
                    header: prev.addr(),
                });
            }
            if addr != expected_addr {
                return Err(PoolViolation::NotContiguous {
                    header: prev.addr(),
                    end: expected_addr,
                    next: addr,
                });
            }
            let end = block.end();
            if end > self.end() {
                return Err(PoolViolation::OutOfBounds { header: addr });
            }

            accounted += HEADER_SIZE + block.used + block.reserved + block.unused;
            expected_addr = end;
            prev = current;
            current = block.next;
        }

        if expected_addr != self.end() || accounted != self.size {
            return Err(PoolViolation::Conservation {
                expected: self.size,
                found: accounted,
            });
        }
        Ok(())
    }

    pub(crate) fn dump(&self) {
        self.for_each(|block| {
            let tag = block.tag.to_le_bytes();
            debug!(
                "  {:#x}: tag {:?} used {:#x} reserved {:#x} unused {:#x} align {:#x}{}",
                block.address(),
                core::str::from_utf8(&tag).unwrap_or("????"),
                block.used,
                block.reserved,
                block.unused,
                1usize << block.info.align_shift(),
                if block.is_head() { " (head)" } else { "" }
            );
        });
    }
}

#[cold]
fn corrupted(block: &BlockHeader) -> ! {
    log::error!(
        "pool: block header at {:#x} failed its checksum ({:#06x} stored, {:#06x} computed)",
        block.address(),
        block.checksum,
        block.compute_checksum()
    );
    panic!(
        "pool: checksum mismatch in block header at {:#x}",
        block.address()
    )
}
