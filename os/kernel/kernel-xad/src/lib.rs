//! # Extent Descriptor Trees
//!
//! Tracks which parts of an address region (physical memory, or the kernel's
//! virtual address range) are free, reserved or in use. The region is
//! partitioned into [`Extent`]s, each a half-open range with an
//! [`ExtentType`]. Extents are indexed twice:
//!
//! * by address, in a [`kernel_avl::AvlTree`] whose comparator treats
//!   overlapping ranges as equal, so "which extent contains `a`" is a single
//!   descent and overlapping inserts are rejected;
//! * free extents only, by size, in 64 buckets of `floor(log2(pages))`, so
//!   "any free range of at least `n` bytes" starts at the smallest bucket
//!   that can hold `n` instead of scanning the tree.
//!
//! ```text
//!  region  [0x0 ..................................................... 0x100000)
//!  extents [0x0, 0x1000) free | [0x1000, 0x2000) in-use | [0x2000, 0x100000) free
//!  buckets  0: [0x0,0x1000)                         7: [0x2000,0x100000)
//! ```
//!
//! The central operation is [`XadTree::reclaim`]: retype a sub-range of an
//! extent, splitting it into up to three pieces and merging the result with
//! same-typed neighbors. Freeing is a reclaim back to the recorded
//! [`previous type`](Extent::previous_type).
//!
//! No internal locking; owners wrap a tree in a `kernel_sync::SpinLock`.
//!
//! ## Features
//!
//! * `paranoid`: run [`XadTree::check_invariants`] after every reclaim and
//!   merge and panic on the first defect.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod bucket;
mod check;
mod error;
mod extent;
mod query;
mod tree;

pub use bucket::{BucketIter, bucket_of};
pub use error::{ExtentViolation, XadError};
pub use extent::{Extent, ExtentAdapter, ExtentRange, ExtentType};
pub use kernel_avl::NodeId;
pub use query::{ExtentQuery, LookupFlags};
pub use tree::XadTree;
