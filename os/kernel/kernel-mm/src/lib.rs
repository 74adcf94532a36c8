//! # Kernel Memory Manager
//!
//! Ties the extent trees and the pools together into the allocation surface
//! the rest of the kernel uses:
//!
//! * [`MemoryManager::allocate_virtual`] / [`allocate_physical`](MemoryManager::allocate_physical)
//!   round to pages, pick a free extent (at the hinted address if possible,
//!   otherwise by size) and retype it.
//! * [`MemoryManager::free_virtual`] / [`free_physical`](MemoryManager::free_physical)
//!   return a range to the type it had before.
//! * [`MemoryManager::allocate_physical_gather`] covers a request with
//!   several free extents when no single one is large enough, and tells
//!   "not enough memory anywhere" ([`MemoryError::InsufficientMemory`]) apart
//!   from "not enough room to describe it" ([`MemoryError::BufferTooSmall`]).
//! * [`MemoryManager::pool_allocate`] / [`pool_free`](MemoryManager::pool_free)
//!   route small objects to the attached pools.
//!
//! Each address space and each pool carries its own spin lock. A failed call
//! leaves the instance it touched unchanged.
//!
//! ```rust
//! use kernel_info::memory::PAGE_SIZE;
//! use kernel_mm::{ExtentType, MemoryConfig, MemoryManager};
//!
//! let mm = MemoryManager::new(&MemoryConfig::default()).unwrap();
//! let frames = mm.allocate_physical(None, 3 * PAGE_SIZE, ExtentType::IN_USE).unwrap();
//! assert_eq!(mm.query_physical(frames).unwrap().ty(), ExtentType::IN_USE);
//! assert_eq!(mm.free_physical(frames, Some(3 * PAGE_SIZE)), Ok(3 * PAGE_SIZE));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod address_space;
mod config;
mod error;
mod manager;

pub use address_space::AddressSpace;
pub use config::MemoryConfig;
pub use error::MemoryError;
pub use manager::{MemoryManager, global};

pub use kernel_pool::{IntegrityPolicy, Pool, PoolError, pool_tag};
pub use kernel_xad::{Extent, ExtentRange, ExtentType};
