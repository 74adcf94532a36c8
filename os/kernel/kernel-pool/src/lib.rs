//! # Kernel Pool Allocator
//!
//! Serves variably sized, aligned kernel objects out of one fixed arena. The
//! arena is handed over once (typically a range reserved in an extent tree)
//! and never grows.
//!
//! ## Design outline
//! - **Block list**: the arena is tiled by blocks, each starting with a
//!   [`BlockInfo`]-carrying header that records the requested size, the
//!   round-up padding and the unused space up to the next header. Headers are
//!   doubly linked in address order. The first block (the *head*) sits at the
//!   arena base and owns all space that precedes the first allocation.
//! - **Allocation**: first fit. The list is walked in address order and the
//!   first block whose unused tail can hold a header plus the aligned payload
//!   donates it: a new header is written right before the aligned payload and
//!   the donor's tail shrinks to end at that header.
//! - **Free**: the target block and any free blocks around it are unlinked and
//!   zeroed, and their space is folded into the unused tail of the nearest
//!   earlier allocated block (or the head).
//! - **Integrity**: every header carries a 16-bit byte-sum checksum. Each
//!   header an operation reads is verified; a mismatch means memory safety is
//!   already lost and panics. [`IntegrityPolicy::Full`] additionally walks the
//!   whole list after each call.
//! - **Synchronization**: a [`kernel_sync::SpinLock`] per pool, taken with
//!   [`lock_irq`](kernel_sync::SpinLock::lock_irq) since interrupt handlers
//!   allocate too.
//!
//! ## Example
//!
//! ```rust
//! use core::ptr::NonNull;
//! use kernel_info::region::MemoryKind;
//! use kernel_pool::{IntegrityPolicy, Pool, pool_tag};
//!
//! #[repr(align(16))]
//! struct Arena([u8; 0x1000]);
//! let arena = Box::leak(Box::new(Arena([0; 0x1000])));
//! let base = NonNull::new(arena.0.as_mut_ptr()).unwrap();
//!
//! let pool = unsafe { Pool::from_raw_parts(MemoryKind::NonPagedPool, base, 0x1000, IntegrityPolicy::Full) }.unwrap();
//! let object = pool.allocate(0x40, 16, pool_tag(*b"Demo")).unwrap();
//! assert_eq!(pool.free(object), Ok(0x40));
//! assert_eq!(pool.stats().total(), 0x1000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod error;
mod header;
mod list;
mod pool;

pub use error::{PoolError, PoolViolation};
pub use header::{BlockInfo, HEAD_TAG, HEADER_SIZE, pool_tag};
pub use pool::{GLOBAL_ALLOC_TAG, IntegrityPolicy, Pool, PoolStats};
