//! # Reaching physical memory from the kernel
//!
//! Code can only dereference virtual addresses. On MIPS the kernel sees all of
//! RAM (up to 512 MiB) through the KSEG0 direct map: physical address `pa` is
//! visible at `MIPS_KSEG0 + pa`. The two conversions in this module are the
//! only places where a [`PhysicalAddress`] becomes a [`VirtualAddress`] or
//! back.
//!
//! [`PhysMapper`] abstracts how the bytes are actually reached, so the same
//! allocator and address-space code runs on the target ([`Kseg0PhysMapper`])
//! and against simulated RAM in host tests (`sim::SimRam`).

use kernel_info::memory::{KSEG0_SIZE, MIPS_KSEG0, MIPS_KSEG1};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Access to physical memory through some kernel-visible window.
pub trait PhysMapper {
    /// Pointer through which the kernel can read and write the byte at `pa`.
    ///
    /// # Safety
    /// - `pa` must lie in RAM covered by this mapper.
    /// - The pointer is valid only while `self` is alive, and only for the
    ///   bytes the caller owns (frames it allocated, or the ledger).
    unsafe fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;
}

/// KSEG0 kernel virtual address of physical address `pa`.
///
/// # Panics
/// In debug builds, if `pa` lies beyond the 512 MiB KSEG0 window.
#[inline]
#[must_use]
pub const fn paddr_to_kvaddr(pa: PhysicalAddress) -> VirtualAddress {
    debug_assert!(pa.as_u32() < KSEG0_SIZE, "physical address beyond KSEG0");
    VirtualAddress::new(MIPS_KSEG0 + pa.as_u32())
}

/// Physical address behind a KSEG0 kernel virtual address.
///
/// Returns `None` for addresses outside KSEG0 (user space, KSEG1, KSEG2),
/// which are not direct-mapped RAM.
#[inline]
#[must_use]
pub const fn kvaddr_to_paddr(va: VirtualAddress) -> Option<PhysicalAddress> {
    let raw = va.as_u32();
    if raw >= MIPS_KSEG0 && raw < MIPS_KSEG1 {
        Some(PhysicalAddress::new(raw - MIPS_KSEG0))
    } else {
        None
    }
}

/// [`PhysMapper`] for the real machine: dereferences through KSEG0.
#[derive(Debug, Default, Copy, Clone)]
pub struct Kseg0PhysMapper;

impl PhysMapper for Kseg0PhysMapper {
    unsafe fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        core::ptr::with_exposed_provenance_mut(paddr_to_kvaddr(pa).as_usize())
    }
}
