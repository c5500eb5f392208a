//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the 32-bit addresses used by the MIPS VM code.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |----------|-------------|
//! | [`MemoryAddress`] | A raw 32-bit address, either physical or virtual. |
//! | [`VirtualAddress`] | An address in a program's or the kernel's virtual space. |
//! | [`PhysicalAddress`] | An address in physical RAM. |
//!
//! There is exactly one page size on this machine, [`PAGE_SIZE`] (4 KiB).
//! The TLB maps single pages, so there are no huge-page variants.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! // A program segment declared at an unaligned address...
//! let va = VirtualAddress::new(0x0040_0123);
//! let size = 0x1F00;
//!
//! // ...is widened to whole pages.
//! let base = va.align_down();
//! let pages = pages_for(size + va.page_offset());
//! assert_eq!(base.as_u32(), 0x0040_0000);
//! assert_eq!(pages, 3);
//! assert!(base.as_u32() + pages * PAGE_SIZE >= va.as_u32() + size);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`, and
//!   `Hash`.
//! - There is deliberately no `From` between virtual and physical addresses.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod memory_address;
mod physical_address;
mod virtual_address;

pub use memory_address::MemoryAddress;
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Page size in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// log2([`PAGE_SIZE`]).
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the page-number bits of an address.
pub const PAGE_FRAME: u32 = !(PAGE_SIZE - 1);

/// Number of whole pages needed to hold `bytes` bytes.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u32) -> u32 {
    bytes.div_ceil(PAGE_SIZE)
}

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(PAGE_FRAME == 0xFFFF_F000);
};
