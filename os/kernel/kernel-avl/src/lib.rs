//! # Arena-backed AVL Tree
//!
//! A generic, self-balancing binary search tree used as the ordered index of
//! the extent trees (and anything else in the kernel that needs an ordered
//! set, e.g. timer deadlines). The tree knows nothing about addresses: key
//! extraction, three-way comparison and stringification are supplied by the
//! caller through a [`TreeAdapter`] bound at construction time.
//!
//! ## Storage model
//!
//! Nodes live in an arena owned by the tree and are addressed by
//! [`NodeId`] handles instead of raw pointers:
//!
//! ```text
//!   arena: [ slot0 | slot1 | slot2 | ... ]
//!             │       │
//!             ▼       ▼
//!          ┌──────┐ ┌──────┐
//!          │parent│ │parent│   parent/left/right are Option<NodeId>,
//!          │left  │ │left  │   height is the AVL subtree height
//!          │right │ │right │   (1 for a leaf, 0 for a missing child)
//!          │height│ │height│
//!          │value │ │value │
//!          └──────┘ └──────┘
//! ```
//!
//! Rotations are index reassignments; the three-way links never alias a Rust
//! reference. Each slot carries a generation counter, so a handle to a node
//! that was removed (and whose slot may since have been reused) is rejected
//! with [`AvlError::StaleHandle`] rather than silently resolving to a
//! different node.
//!
//! Node handles are stable for the lifetime of the node: removal of a node
//! with two children relinks its in-order successor into its place instead
//! of moving values between slots, so callers may keep `NodeId`s in side
//! structures (the extent tree threads its size buckets through them).
//!
//! ## Balance invariant
//!
//! For every node `height = 1 + max(height(left), height(right))` and the
//! balance factor `height(right) - height(left)` is in `{-1, 0, 1}` once an
//! [`insert`](AvlTree::insert) or [`remove`](AvlTree::remove) returns.
//! [`AvlTree::check_invariants`] verifies this together with ordering and
//! link symmetry.
//!
//! ## Concurrency
//!
//! No internal locking. Shared trees are wrapped in a
//! `kernel_sync::SpinLock` by their owner.
//!
//! ## Example
//!
//! ```rust
//! use kernel_avl::{AvlTree, LookupMode, OrdAdapter};
//!
//! let mut tree = AvlTree::new(OrdAdapter::<u64>::new());
//! for deadline in [30, 10, 20, 40] {
//!     tree.insert(deadline).unwrap();
//! }
//! let next = tree.lookup(&25, LookupMode::EqualOrAbove).unwrap();
//! assert_eq!(tree.get(next), Some(&30));
//! assert!(tree.insert(20).is_err());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod adapter;
mod arena;
mod check;
mod error;
mod tree;

pub use adapter::{OrdAdapter, TreeAdapter};
pub use arena::NodeId;
pub use check::InvariantViolation;
pub use error::AvlError;
pub use tree::{AvlTree, Iter, LookupMode};
