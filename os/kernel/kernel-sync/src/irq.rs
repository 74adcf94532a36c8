//! Interrupt masking around spin locks that interrupt handlers also take.

use crate::{SpinLock, SpinLockGuard};
use core::ops::{Deref, DerefMut};

/// RAII guard that masks interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the `IF` bit (bit 9 of `RFLAGS`). If interrupts
/// were enabled it executes `cli`; on drop it executes `sti` **only** if they
/// were enabled before, so nested guards compose.
///
/// # Platform
///
/// Only the bare-metal `x86_64` build touches `RFLAGS`. Hosted builds run
/// unprivileged, where `cli` faults, and the guard never masks anything.
pub struct IrqGuard {
    /// Whether interrupts were enabled (IF=1) when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let were_enabled = arch::interrupts_enabled();
        if were_enabled {
            arch::disable_interrupts();
        }
        Self { were_enabled }
    }

    /// Whether this guard masked interrupts and will unmask them on drop.
    #[inline]
    #[must_use]
    pub const fn were_enabled(&self) -> bool {
        self.were_enabled
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            arch::enable_interrupts();
        }
    }
}

/// A [`SpinLockGuard`] taken with interrupts masked.
///
/// Fields drop in declaration order: the lock is released before
/// interrupts come back.
pub struct IrqSpinLockGuard<'a, T> {
    guard: SpinLockGuard<'a, T>,
    irq: IrqGuard,
}

impl<T> IrqSpinLockGuard<'_, T> {
    #[must_use]
    pub fn lock_name(&self) -> &'static str {
        self.guard.lock_name()
    }

    #[must_use]
    pub const fn masked_interrupts(&self) -> bool {
        self.irq.were_enabled()
    }
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> SpinLock<T> {
    /// Mask interrupts, then spin until acquired.
    ///
    /// Use this for any lock an interrupt handler may also take: a handler
    /// that interrupts the holder would otherwise spin on it forever.
    #[inline]
    pub fn lock_irq(&self) -> IrqSpinLockGuard<'_, T> {
        let irq = IrqGuard::new();
        let guard = self.lock();
        IrqSpinLockGuard { guard, irq }
    }
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
mod arch {
    const RFLAGS_IF: u64 = 1 << 9;

    #[inline]
    pub fn interrupts_enabled() -> bool {
        let rflags: u64;
        // Safety: reads RFLAGS through the stack, no other side effects.
        unsafe {
            core::arch::asm!("pushfq; pop {}", out(reg) rflags, options(preserves_flags));
        }
        rflags & RFLAGS_IF != 0
    }

    #[inline]
    pub fn disable_interrupts() {
        // Safety: kernel code runs at CPL 0.
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn enable_interrupts() {
        // Safety: only restores a state observed by `interrupts_enabled`.
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}

#[cfg(not(all(target_os = "none", target_arch = "x86_64")))]
mod arch {
    #[inline]
    pub const fn interrupts_enabled() -> bool {
        false
    }

    #[inline]
    pub const fn disable_interrupts() {}

    #[inline]
    pub const fn enable_interrupts() {}
}
