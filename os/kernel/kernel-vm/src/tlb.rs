//! # Translation Lookaside Buffer
//!
//! The MIPS TLB is the only translation structure in the machine: there are
//! no page tables, every mapping the CPU uses is one of [`NUM_TLB`] software
//! loaded slots. Each slot holds an [`EntryHi`] (what to match) and an
//! [`EntryLo`] (where it goes).
//!
//! [`TlbHardware`] is the raw slot read/write interface the platform provides.
//! [`Mmu`] owns it together with the interrupt control and is the only code
//! that touches slots; every operation runs with interrupts disabled.

use bitfield_struct::bitfield;
use kernel_info::memory::{MIPS_KSEG0, MIPS_KSEG1};
use kernel_memory_addresses::{PAGE_SHIFT, PhysicalAddress, VirtualAddress};
use kernel_sync::{InterruptControl, IrqGuard};
use log::trace;

/// Number of TLB slots.
pub const NUM_TLB: usize = 64;

/// TLB `EntryHi`: virtual page to match.
///
/// Layout (LSB→MSB):
/// - bits 0..5: unused
/// - bits 6..11: address-space id (unused by this VM system, always 0)
/// - bits 12..31: virtual page number
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct EntryHi {
    #[bits(6)]
    __: u32,
    #[bits(6)]
    pub pid: u8,
    #[bits(20)]
    pub vpn: u32,
}

impl EntryHi {
    /// Match entry for the page containing `va`.
    #[inline]
    #[must_use]
    pub const fn for_page(va: VirtualAddress) -> Self {
        Self::new().with_vpn(va.page_number())
    }

    /// Distinct, never-matching `EntryHi` for an invalidated `slot`.
    ///
    /// Each slot gets its own KSEG0 page: two identical `EntryHi` values in
    /// the TLB are a machine check, and KSEG0 addresses never go through the
    /// TLB.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn invalid(slot: usize) -> Self {
        Self::new().with_vpn((MIPS_KSEG0 >> PAGE_SHIFT) + slot as u32)
    }

    #[inline]
    #[must_use]
    pub const fn page(self) -> VirtualAddress {
        VirtualAddress::new(self.vpn() << PAGE_SHIFT)
    }
}

/// TLB `EntryLo`: physical frame and attributes.
///
/// Layout (LSB→MSB):
/// - bits 0..7: unused
/// - bit 8: global (ignore the address-space id)
/// - bit 9: valid
/// - bit 10: dirty, i.e. **writable**; a store through a clean entry traps
/// - bit 11: no-cache
/// - bits 12..31: physical frame number
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct EntryLo {
    #[bits(8)]
    __: u32,
    pub global: bool,
    pub valid: bool,
    pub dirty: bool,
    pub nocache: bool,
    #[bits(20)]
    pub pfn: u32,
}

impl EntryLo {
    /// Valid mapping onto the frame containing `pa`.
    #[inline]
    #[must_use]
    pub const fn mapping(pa: PhysicalAddress, dirty: bool) -> Self {
        Self::new()
            .with_pfn(pa.frame_number())
            .with_valid(true)
            .with_dirty(dirty)
    }

    #[inline]
    #[must_use]
    pub const fn frame(self) -> PhysicalAddress {
        PhysicalAddress::from_frame_number(self.pfn())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TlbEntry {
    pub hi: EntryHi,
    pub lo: EntryLo,
}

impl TlbEntry {
    /// The contents of an invalidated slot.
    #[inline]
    #[must_use]
    pub const fn invalid(slot: usize) -> Self {
        Self {
            hi: EntryHi::invalid(slot),
            lo: EntryLo::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.lo.valid()
    }
}

/// Raw TLB access (`tlb_read`, `tlb_write`, `tlb_random`).
///
/// Implementations need not be reentrant: [`Mmu`] only calls them with
/// interrupts disabled.
pub trait TlbHardware {
    /// Read slot `slot` (`0..NUM_TLB`).
    fn read(&self, slot: usize) -> TlbEntry;

    /// Write `entry` into slot `slot`.
    fn write(&self, entry: TlbEntry, slot: usize);

    /// Write `entry` into a slot chosen by the hardware's replacement policy.
    fn write_random(&self, entry: TlbEntry);
}

/// Where [`Mmu::install`] put an entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Placement {
    /// The first slot that was invalid.
    Slot(usize),
    /// Every slot was valid; the hardware chose the victim.
    Random,
}

/// Sole owner of the translation buffer.
pub struct Mmu<T, I> {
    tlb: T,
    irq: I,
}

impl<T: TlbHardware, I: InterruptControl> Mmu<T, I> {
    #[must_use]
    pub const fn new(tlb: T, irq: I) -> Self {
        Self { tlb, irq }
    }

    #[inline]
    #[must_use]
    pub const fn tlb(&self) -> &T {
        &self.tlb
    }

    #[inline]
    #[must_use]
    pub const fn interrupts(&self) -> &I {
        &self.irq
    }

    /// Invalidate every slot.
    pub fn invalidate_all(&self) {
        let _irq = IrqGuard::new(&self.irq);
        for slot in 0..NUM_TLB {
            self.tlb.write(TlbEntry::invalid(slot), slot);
        }
    }

    /// Install a valid mapping of the page containing `va` onto the frame
    /// containing `pa`.
    pub fn install(&self, va: VirtualAddress, pa: PhysicalAddress, dirty: bool) -> Placement {
        let entry = TlbEntry {
            hi: EntryHi::for_page(va),
            lo: EntryLo::mapping(pa, dirty),
        };

        let _irq = IrqGuard::new(&self.irq);
        let free = (0..NUM_TLB).find(|&slot| !self.tlb.read(slot).is_valid());
        if let Some(slot) = free {
            trace!("tlb: {va} -> {pa} in slot {slot}");
            self.tlb.write(entry, slot);
            Placement::Slot(slot)
        } else {
            trace!("tlb: full, {va} -> {pa} replaces a random slot");
            self.tlb.write_random(entry);
            Placement::Random
        }
    }
}

const _: () = {
    assert!(NUM_TLB == 64);
    // invalid EntryHi pages stay inside KSEG0
    assert!((MIPS_KSEG0 >> PAGE_SHIFT) + NUM_TLB as u32 <= (MIPS_KSEG1 >> PAGE_SHIFT));
};
