//! # Kernel synchronization primitives
//!
//! The VM system needs exactly two kinds of exclusion:
//!
//! - [`SpinLock`] serializes the frame allocator's scan-and-mark against frees.
//! - [`IrqGuard`] keeps the TLB fault handler from being interrupted while it
//!   rewrites translation-buffer slots.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;

pub use irq::{InterruptControl, IrqGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
