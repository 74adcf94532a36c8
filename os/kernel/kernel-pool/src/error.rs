/// Recoverable pool errors. Header corruption is never reported here; it
/// panics.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Zero-sized request.
    #[error("invalid argument: zero-sized allocation")]
    InvalidArgument,
    /// Alignment with more than one bit set.
    #[error("invalid alignment {0:#x}")]
    InvalidAlignment(usize),
    /// No block has a large enough unused tail.
    #[error("no block can hold {size:#x} bytes aligned to {align:#x}")]
    OutOfMemory { size: usize, align: usize },
    /// The pointer is not the payload of a live allocation in this pool.
    #[error("{0:#x} is not an allocation of this pool")]
    InvalidPointer(usize),
    /// Arena base misaligned or too small to hold a header.
    #[error("unusable arena at {start:#x} with {size:#x} bytes")]
    InvalidRegion { start: usize, size: usize },
}

/// A defect found by [`Pool::check_invariants`](crate::Pool::check_invariants).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolViolation {
    #[error("header at {header:#x}: checksum {stored:#06x}, computed {computed:#06x}")]
    ChecksumMismatch {
        header: usize,
        stored: u16,
        computed: u16,
    },
    #[error("header at {header:#x} is not linked back by its successor")]
    BrokenLink { header: usize },
    #[error("block at {header:#x} ends at {end:#x} but the next block starts at {next:#x}")]
    NotContiguous { header: usize, end: usize, next: usize },
    #[error("block at {header:#x} leaves the arena")]
    OutOfBounds { header: usize },
    #[error("blocks account for {found:#x} bytes, arena holds {expected:#x}")]
    Conservation { expected: usize, found: usize },
}
