//! # Memory Regions

use crate::memory::{
    NON_PAGED_POOL_SIZE, PAGED_POOL_SIZE, PHYSICAL_ARENA_SIZE, PHYSICAL_ARENA_START,
    VIRTUAL_ARENA_SIZE, VIRTUAL_ARENA_START,
};
use core::fmt;

/// The kind of a process-wide memory instance.
///
/// Pools serve small kernel objects out of a fixed arena, address spaces
/// track reserved ranges in an extent tree.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MemoryKind {
    /// Pool whose arena is never paged out.
    NonPagedPool = 0,
    /// Pool whose arena may be paged.
    PagedPool = 1,
    /// Physical address space.
    Physical = 2,
    /// Kernel virtual address space.
    Virtual = 3,
}

impl MemoryKind {
    /// Every kind, in index order.
    pub const ALL: [Self; 4] = [
        Self::NonPagedPool,
        Self::PagedPool,
        Self::Physical,
        Self::Virtual,
    ];

    /// Dense index, usable for per-kind tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    #[must_use]
    pub const fn is_pool(self) -> bool {
        matches!(self, Self::NonPagedPool | Self::PagedPool)
    }

    #[inline]
    #[must_use]
    pub const fn is_address_space(self) -> bool {
        matches!(self, Self::Physical | Self::Virtual)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NonPagedPool => "non-paged",
            Self::PagedPool => "paged",
            Self::Physical => "physical",
            Self::Virtual => "virtual",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arena parameters for one memory instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RegionConfig {
    pub kind: MemoryKind,
    pub area_start: usize,
    pub area_size: usize,
}

impl RegionConfig {
    #[must_use]
    pub const fn new(kind: MemoryKind, area_start: usize, area_size: usize) -> Self {
        Self {
            kind,
            area_start,
            area_size,
        }
    }

    /// Exclusive end of the arena, or `None` if it wraps the address space.
    #[inline]
    #[must_use]
    pub const fn area_end(&self) -> Option<usize> {
        self.area_start.checked_add(self.area_size)
    }

    /// Whether `address` lies inside the arena.
    #[inline]
    #[must_use]
    pub const fn contains(&self, address: usize) -> bool {
        match self.area_end() {
            Some(end) => address >= self.area_start && address < end,
            None => address >= self.area_start,
        }
    }

    /// Default virtual address space region.
    #[must_use]
    pub const fn default_virtual() -> Self {
        Self::new(
            MemoryKind::Virtual,
            VIRTUAL_ARENA_START as usize,
            VIRTUAL_ARENA_SIZE as usize,
        )
    }

    /// Default physical address space region.
    #[must_use]
    pub const fn default_physical() -> Self {
        Self::new(
            MemoryKind::Physical,
            PHYSICAL_ARENA_START as usize,
            PHYSICAL_ARENA_SIZE as usize,
        )
    }

    /// Pool region of the default size for `kind`, placed at `area_start`.
    #[must_use]
    pub const fn default_pool(kind: MemoryKind, area_start: usize) -> Self {
        let area_size = match kind {
            MemoryKind::PagedPool => PAGED_POOL_SIZE,
            _ => NON_PAGED_POOL_SIZE,
        };
        Self::new(kind, area_start, area_size)
    }
}

impl fmt::Display for RegionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:#018x}, +{:#x})",
            self.kind, self.area_start, self.area_size
        )
    }
}
