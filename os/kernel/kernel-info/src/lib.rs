//! # Memory Manager Configuration
//!
//! This crate is the single source of truth for the memory layout the
//! memory-management core is bootstrapped with. It holds no logic beyond
//! small `const fn` helpers, so every other crate (extent trees, pools, the
//! allocation facade) can depend on it without pulling in anything else.
//!
//! ## Modules
//!
//! ### Memory Layout ([`memory`])
//! Page granularity, the number of extent size buckets, and the default
//! arenas handed to each memory kind at boot.
//!
//! ### Regions ([`region`])
//! [`MemoryKind`](region::MemoryKind) enumerates the process-wide instances
//! (non-paged pool, paged pool, physical and virtual address spaces) and
//! [`RegionConfig`](region::RegionConfig) parameterizes one of them with its
//! arena base and size:
//!
//! ```text
//! RegionConfig { kind: MemoryKind, area_start: usize, area_size: usize }
//! ```
//!
//! ## Default layout
//!
//! ```text
//! Virtual Address Space (kernel half):
//!
//! VIRTUAL_ARENA_START   ┌─────────────────────────────────┐ 0xffff_c000_0000_0000
//!                       │  Virtual extent tree arena      │
//!                       │  (reserved ranges, no backing)  │
//! VIRTUAL_ARENA_END     └─────────────────────────────────┘ 0xffff_d000_0000_0000
//!
//! Physical Address Space:
//!
//! PHYSICAL_ARENA_START  ┌─────────────────────────────────┐ 0x0000_0000_0010_0000
//!                       │  Physical extent tree arena     │
//! PHYSICAL_ARENA_END    └─────────────────────────────────┘ 0x0000_0000_2010_0000
//! ```
//!
//! Pools are carved out of memory the bootstrap code already owns; only
//! their sizes are fixed here.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod memory;
pub mod region;
