use crate::{ExtentRange, ExtentType};
use kernel_avl::{AvlError, InvariantViolation, NodeId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XadError {
    /// Empty, inverted, or outside the tracked region.
    #[error("invalid range [{start:#x}, {end:#x})")]
    InvalidRange { start: u64, end: u64 },
    /// No extent satisfies the lookup.
    #[error("no matching extent")]
    NotFound,
    /// The handle does not refer to a live extent.
    #[error("extent handle {0} is stale")]
    StaleHandle(NodeId),
    /// The target extent does not carry the expected type.
    #[error("extent has type {found}, expected {expected}")]
    TypeMismatch {
        expected: ExtentType,
        found: ExtentType,
    },
    /// The range overlaps an extent that is already tracked.
    #[error("range overlaps an existing extent")]
    Overlap,
}

impl From<AvlError> for XadError {
    fn from(value: AvlError) -> Self {
        match value {
            AvlError::KeyCollision { .. } => Self::Overlap,
            AvlError::StaleHandle(id) => Self::StaleHandle(id),
        }
    }
}

/// A structural defect found by [`XadTree::check_invariants`](crate::XadTree::check_invariants).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtentViolation {
    #[error("tree: {0}")]
    Tree(#[from] InvariantViolation),
    #[error("region starts at {expected:#x} but the first extent starts at {found:#x}")]
    BadStart { expected: u64, found: u64 },
    #[error("region ends at {expected:#x} but the last extent ends at {found:#x}")]
    BadEnd { expected: u64, found: u64 },
    #[error("hole or overlap between {left} and {right}")]
    NotContiguous { left: ExtentRange, right: ExtentRange },
    #[error("adjacent extents {left} and {right} share type {ty}")]
    Unmerged {
        left: ExtentRange,
        right: ExtentRange,
        ty: ExtentType,
    },
    #[error("extent {range} sits in bucket {found}, expected {expected}")]
    WrongBucket {
        range: ExtentRange,
        expected: usize,
        found: usize,
    },
    #[error("bucket {bucket} has a broken link at {node}")]
    BrokenBucketLink { bucket: usize, node: NodeId },
    #[error("buckets hold {linked} extent(s), tree holds {tracked} free")]
    BucketCount { linked: usize, tracked: usize },
    #[error("{ty} extent {range} has the wrong bucket membership (linked: {linked})")]
    BucketMembership {
        range: ExtentRange,
        ty: ExtentType,
        linked: bool,
    },
    #[error("the tree holds no extents")]
    Empty,
}
