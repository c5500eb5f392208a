//! # Kernel Memory Layout
//!
//! Fixed facts about the machine and the memory model that the VM code builds
//! on. Nothing here is configurable at runtime: the design is a fixed,
//! load-everything, never-evict model, and the numbers below are part of its
//! contract with the process layer and the program loader.
//!
//! ## MIPS segments
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │ KUSEG  user space, TLB-mapped   │
//!             │   region 1, region 2 ...        │
//!             │   ... user stack (12 pages)     │
//! 0x8000_0000 ├─────────────────────────────────┤ ◄ USER_STACK_TOP
//!             │ KSEG0  direct-mapped, cached    │
//! 0xA000_0000 ├─────────────────────────────────┤
//!             │ KSEG1  direct-mapped, uncached  │
//! 0xC000_0000 ├─────────────────────────────────┤
//!             │ KSEG2  kernel, TLB-mapped       │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! The kernel reaches physical memory exclusively through KSEG0.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod memory;
