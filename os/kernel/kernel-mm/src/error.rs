use kernel_info::region::MemoryKind;
use kernel_pool::PoolError;
use kernel_xad::{ExtentType, XadError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// Zero size, a request to allocate as [`ExtentType::FREE`], or a size
    /// that overflows when rounded to pages.
    #[error("invalid argument")]
    InvalidArgument,
    /// Empty, inverted, or not inside the owning extent.
    #[error("invalid range [{start:#x}, {end:#x})")]
    InvalidRange { start: u64, end: u64 },
    /// A region in the configuration does not describe its slot.
    #[error("invalid {kind} region configuration")]
    InvalidConfig { kind: MemoryKind },
    /// No extent matches: nothing tracked at the address, or no single free
    /// range is large enough. A gather allocation may still succeed.
    #[error("no matching range")]
    NotFound,
    /// The address lies in a free extent.
    #[error("{0:#x} is not allocated")]
    NotAllocated(u64),
    #[error("range has type {found}, expected {expected}")]
    TypeMismatch {
        expected: ExtentType,
        found: ExtentType,
    },
    /// Less free space in the whole region than requested.
    #[error("insufficient memory: {requested:#x} bytes requested, {available:#x} free")]
    InsufficientMemory { requested: u64, available: u64 },
    /// The caller's piece list filled up before the request was covered.
    #[error("buffer of {capacity} piece(s) is too small")]
    BufferTooSmall { capacity: usize },
    /// No pool of this kind is attached.
    #[error("no {0} pool")]
    NoPool(MemoryKind),
    #[error("a {0} pool is already attached")]
    PoolExists(MemoryKind),
    #[error("a memory manager is already installed")]
    AlreadyInstalled,
    #[error("pool: {0}")]
    Pool(#[from] PoolError),
    #[error("extent tree: {0}")]
    Extent(XadError),
}

impl MemoryError {
    /// Whether the request failed for lack of memory (or room to describe
    /// it) rather than because of a bad argument or lookup.
    #[must_use]
    pub const fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::InsufficientMemory { .. }
                | Self::BufferTooSmall { .. }
                | Self::Pool(PoolError::OutOfMemory { .. })
        )
    }
}

impl From<XadError> for MemoryError {
    fn from(value: XadError) -> Self {
        match value {
            XadError::InvalidRange { start, end } => Self::InvalidRange { start, end },
            XadError::NotFound => Self::NotFound,
            XadError::TypeMismatch { expected, found } => Self::TypeMismatch { expected, found },
            other => Self::Extent(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_is_distinct_from_lookup_failure() {
        assert!(!MemoryError::NotFound.is_exhaustion());
        assert!(MemoryError::InsufficientMemory {
            requested: 2,
            available: 1
        }
        .is_exhaustion());
        assert!(MemoryError::BufferTooSmall { capacity: 1 }.is_exhaustion());
        assert!(
            MemoryError::from(PoolError::OutOfMemory { size: 1, align: 16 }).is_exhaustion()
        );
        assert!(!MemoryError::from(PoolError::InvalidAlignment(3)).is_exhaustion());
    }

    #[test]
    fn extent_errors_map_onto_the_taxonomy() {
        assert_eq!(MemoryError::from(XadError::NotFound), MemoryError::NotFound);
        assert_eq!(
            MemoryError::from(XadError::Overlap),
            MemoryError::Extent(XadError::Overlap)
        );
    }
}
