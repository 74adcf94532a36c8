//! # Kernel synchronization primitives
//!
//! Every shared memory-management instance (a pool, an extent tree) owns
//! exactly one [`SpinLock`]. There is no global address-space lock and no
//! lock ordering between instances: callers take one instance lock at a time,
//! never nested and never re-entrantly.
//!
//! [`SpinLock::lock_irq`] additionally masks interrupts while held, for
//! locks that interrupt handlers take too (the pools).
//!
//! [`SyncOnceCell`] backs the optional process-wide registry install.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;
mod sync_once_cell;

pub use irq::{IrqGuard, IrqSpinLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
