//! # Memory Layout

/// log2 of the page granularity used by the extent trees.
pub const PAGE_SHIFT: u32 = 12;

/// Page granularity for virtual/physical range allocations (4 KiB).
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Number of size buckets per extent tree; bucket `i` holds extents of
/// `2^i ..= 2^(i+1) - 1` pages.
pub const SIZE_BUCKETS: usize = 64;

/// Start of the kernel virtual range tracked by the virtual extent tree.
pub const VIRTUAL_ARENA_START: u64 = 0xffff_c000_0000_0000;

/// Size of the kernel virtual range (16 TiB).
pub const VIRTUAL_ARENA_SIZE: u64 = 0x0000_1000_0000_0000;

/// Exclusive end of the kernel virtual range.
pub const VIRTUAL_ARENA_END: u64 = VIRTUAL_ARENA_START + VIRTUAL_ARENA_SIZE;

/// Start of the physical range tracked by the physical extent tree.
/// Everything below 1 MiB stays with firmware and legacy devices.
pub const PHYSICAL_ARENA_START: u64 = 0x0010_0000;

/// Size of the tracked physical range (512 MiB).
pub const PHYSICAL_ARENA_SIZE: u64 = 512 * 1024 * 1024;

/// Exclusive end of the tracked physical range.
pub const PHYSICAL_ARENA_END: u64 = PHYSICAL_ARENA_START + PHYSICAL_ARENA_SIZE;

/// Default size of the non-paged pool arena.
pub const NON_PAGED_POOL_SIZE: usize = 16 * 1024 * 1024;

/// Default size of the paged pool arena.
pub const PAGED_POOL_SIZE: usize = 64 * 1024 * 1024;

/// Minimum alignment of every pool payload and block header.
pub const POOL_MIN_ALIGN: usize = 16;

/// Round `value` up to the page granularity; `None` on overflow.
#[inline]
#[must_use]
pub const fn page_round_up(value: u64) -> Option<u64> {
    match value.checked_add(PAGE_SIZE - 1) {
        Some(v) => Some(v & !(PAGE_SIZE - 1)),
        None => None,
    }
}

/// Round `value` down to the page granularity.
#[inline]
#[must_use]
pub const fn page_round_down(value: u64) -> u64 {
    value & !(PAGE_SIZE - 1)
}

/// Whether `value` sits on a page boundary.
#[inline]
#[must_use]
pub const fn is_page_aligned(value: u64) -> bool {
    value & (PAGE_SIZE - 1) == 0
}

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(SIZE_BUCKETS == u64::BITS as usize);
    assert!(is_page_aligned(VIRTUAL_ARENA_START));
    assert!(is_page_aligned(VIRTUAL_ARENA_SIZE));
    assert!(VIRTUAL_ARENA_END > VIRTUAL_ARENA_START);
    assert!(is_page_aligned(PHYSICAL_ARENA_START));
    assert!(is_page_aligned(PHYSICAL_ARENA_SIZE));
    assert!(POOL_MIN_ALIGN.is_power_of_two());
    assert!(NON_PAGED_POOL_SIZE.is_multiple_of(POOL_MIN_ALIGN));
    assert!(PAGED_POOL_SIZE.is_multiple_of(POOL_MIN_ALIGN));
};
