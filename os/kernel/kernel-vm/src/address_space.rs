//! # Address Space Descriptor
//!
//! A process's user address space is fixed at load time: up to two program
//! regions (text and data) plus a stack of [`USER_STACK_PAGES`] pages ending
//! at [`USER_STACK_TOP`]. Each is virtually and physically contiguous, so a
//! translation is one subtraction and one addition.
//!
//! ```text
//! 0x0000_0000                                                   0x8000_0000
//! ├── text ──┤   ├── data ──┤                         ├──── stack ────┤
//!    vbase₀         vbase₁                          STACK_BASE     STACK_TOP
//! ```
//!
//! Lifecycle, driven by the program loader and the process layer:
//! [`new`](AddressSpace::new) → [`define_region`](AddressSpace::define_region)
//! (≤ 2) → [`prepare_load`](AddressSpace::prepare_load) →
//! [`define_stack`](AddressSpace::define_stack) →
//! [`complete_load`](AddressSpace::complete_load) → … →
//! [`destroy`](AddressSpace::destroy).
//!
//! The descriptor owns its frames but holds no reference to the allocator;
//! dropping it without calling [`destroy`](AddressSpace::destroy) leaks them.

use crate::error::VmError;
use crate::phys_mapper::PhysMapper;
use crate::phys_mem::PhysicalMemory;
use crate::tlb::{Mmu, TlbHardware};
use bitfield_struct::bitfield;
use kernel_info::memory::{MAX_PROGRAM_REGIONS, USER_STACK_BASE, USER_STACK_PAGES, USER_STACK_TOP};
use kernel_memory_addresses::{PAGE_SHIFT, PAGE_SIZE, PhysicalAddress, VirtualAddress, pages_for};
use kernel_sync::InterruptControl;
use log::{debug, error, warn};

/// Access rights a program segment asks for.
///
/// Recorded by the loader but not enforced: every mapped page is readable and
/// writable (text only becomes clean after [`AddressSpace::complete_load`]).
///
/// Layout (LSB→MSB):
/// - bit 0: read
/// - bit 1: write
/// - bit 2: execute
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    #[bits(5)]
    __: u8,
}

/// Which part of the address space a user address belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Segment {
    /// First program region; write-protected once loaded.
    Text,
    Data,
    Stack,
}

impl Segment {
    const PROGRAM: [Self; MAX_PROGRAM_REGIONS] = [Self::Text, Self::Data];
}

/// A virtually and physically contiguous run of pages.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Region {
    vbase: VirtualAddress,
    npages: usize,
    /// `None` until frames are bound by `prepare_load`.
    pbase: Option<PhysicalAddress>,
}

impl Region {
    #[inline]
    #[must_use]
    pub const fn vbase(&self) -> VirtualAddress {
        self.vbase
    }

    #[inline]
    #[must_use]
    pub const fn npages(&self) -> usize {
        self.npages
    }

    #[inline]
    #[must_use]
    pub const fn pbase(&self) -> Option<PhysicalAddress> {
        self.pbase
    }

    /// First virtual address past the region.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn vend(&self) -> VirtualAddress {
        VirtualAddress::new(self.vbase.as_u32() + self.npages as u32 * PAGE_SIZE)
    }

    /// Physical address backing `va`, if `va` is inside this region and the
    /// region has frames.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let pbase = self.pbase?;
        let offset = va.offset_from(self.vbase)?;
        (((offset >> PAGE_SHIFT) as usize) < self.npages).then_some(pbase + offset)
    }
}

/// Result of classifying a user address.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Translation {
    pub segment: Segment,
    pub pa: PhysicalAddress,
}

#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct AddressSpace {
    regions: [Option<Region>; MAX_PROGRAM_REGIONS],
    stack_pbase: Option<PhysicalAddress>,
    loaded: bool,
}

impl AddressSpace {
    /// `as_create`: an empty address space with no regions and no frames.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: [None; MAX_PROGRAM_REGIONS],
            stack_pbase: None,
            loaded: false,
        }
    }

    /// Declare a program region covering `[vaddr, vaddr + size)`, widened to
    /// whole pages.
    ///
    /// # Errors
    /// - [`VmError::TooManyRegions`] for a third region.
    /// - [`VmError::InvalidRange`] if the pages would wrap the address space,
    ///   reach into the stack or kernel space, or overlap the other region.
    pub fn define_region(
        &mut self,
        vaddr: VirtualAddress,
        size: u32,
        perms: Permissions,
    ) -> Result<(), VmError> {
        let bytes = size
            .checked_add(vaddr.page_offset())
            .ok_or(VmError::InvalidRange(vaddr))?;
        let npages = pages_for(bytes);
        let vbase = vaddr.align_down();
        let vend = npages
            .checked_mul(PAGE_SIZE)
            .and_then(|len| vbase.checked_add(len))
            .ok_or(VmError::InvalidRange(vaddr))?;
        if vend > USER_STACK_BASE {
            warn!("as: region {vbase}..{vend} reaches into the stack or kernel space");
            return Err(VmError::InvalidRange(vaddr));
        }
        if self
            .regions
            .iter()
            .flatten()
            .any(|r| vbase < r.vend() && r.vbase < vend)
        {
            warn!("as: region {vbase}..{vend} overlaps an existing region");
            return Err(VmError::InvalidRange(vaddr));
        }
        let npages = npages as usize;

        let Some((index, slot)) = self
            .regions
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
        else {
            warn!("as: ignoring region at {vaddr}: only {MAX_PROGRAM_REGIONS} regions supported");
            return Err(VmError::TooManyRegions);
        };

        debug!(
            "as: region {index} at {vbase}, {npages} pages (r={} w={} x={})",
            perms.read(),
            perms.write(),
            perms.execute()
        );
        *slot = Some(Region {
            vbase,
            npages,
            pbase: None,
        });
        Ok(())
    }

    /// Bind zero-filled frames to every declared region and the stack.
    ///
    /// Frames obtained before a failure stay bound; [`destroy`](Self::destroy)
    /// reclaims them.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if any allocation fails.
    ///
    /// # Panics
    /// If any frames are already bound.
    pub fn prepare_load<M: PhysMapper + ?Sized, I: InterruptControl>(
        &mut self,
        mem: &PhysicalMemory<'_, M, I>,
    ) -> Result<(), VmError> {
        if self.has_frames() {
            error!("as: prepare_load on an address space that already holds frames");
            panic!("as: prepare_load on an address space that already holds frames");
        }

        for region in self.regions.iter_mut().flatten() {
            let pa = mem.alloc_frames(region.npages).ok_or(VmError::OutOfMemory)?;
            region.pbase = Some(pa);
            // Safety: freshly allocated and owned by this address space.
            unsafe { mem.zero_frames(pa, region.npages) };
        }

        let stack = mem.alloc_frames(USER_STACK_PAGES).ok_or(VmError::OutOfMemory)?;
        self.stack_pbase = Some(stack);
        unsafe { mem.zero_frames(stack, USER_STACK_PAGES) };
        Ok(())
    }

    /// End of the load phase: drop every cached translation so the text
    /// region is remapped clean on its next miss.
    pub fn complete_load<T: TlbHardware, I: InterruptControl>(&mut self, mmu: &Mmu<T, I>) {
        mmu.invalidate_all();
        self.loaded = true;
    }

    /// Initial user stack pointer.
    ///
    /// # Panics
    /// If the stack has no frames yet.
    #[must_use]
    pub fn define_stack(&self) -> VirtualAddress {
        assert!(self.stack_pbase.is_some(), "as: define_stack before prepare_load");
        USER_STACK_TOP
    }

    /// `as_copy`: a new, not yet loaded address space with the same layout,
    /// backed by fresh frames holding a copy of this one's contents.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`]; the partial copy is destroyed first.
    pub fn copy<M: PhysMapper + ?Sized, I: InterruptControl>(
        &self,
        mem: &PhysicalMemory<'_, M, I>,
    ) -> Result<Self, VmError> {
        let mut child = Self {
            regions: self.regions.map(|region| region.map(|r| Region { pbase: None, ..r })),
            stack_pbase: None,
            loaded: false,
        };
        if let Err(e) = child.prepare_load(mem) {
            child.destroy(mem);
            return Err(e);
        }

        for (src, dst) in self.regions.iter().zip(&child.regions) {
            if let (Some(src), Some(dst)) = (src, dst)
                && let (Some(from), Some(to)) = (src.pbase, dst.pbase)
            {
                // Safety: both runs are owned, `to` was just allocated.
                unsafe { mem.copy_frames(to, from, src.npages) };
            }
        }
        if let (Some(from), Some(to)) = (self.stack_pbase, child.stack_pbase) {
            unsafe { mem.copy_frames(to, from, USER_STACK_PAGES) };
        }
        Ok(child)
    }

    /// `as_destroy`: return every bound frame to the allocator.
    pub fn destroy<M: PhysMapper + ?Sized, I: InterruptControl>(self, mem: &PhysicalMemory<'_, M, I>) {
        let program = self.regions.iter().flatten().filter_map(Region::pbase);
        for pa in program.chain(self.stack_pbase) {
            mem.free_frames(pa);
        }
    }

    /// `as_activate`: this address space is about to run. The TLB holds no
    /// address-space ids, so every slot is flushed.
    pub fn activate<T: TlbHardware, I: InterruptControl>(&self, mmu: &Mmu<T, I>) {
        mmu.invalidate_all();
    }

    /// `as_deactivate`: nothing to do, the next activation flushes.
    pub const fn deactivate(&self) {}

    /// Classify `va` and compute its physical address. Text is checked
    /// first, then data, then the stack.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<Translation> {
        let program = self
            .regions
            .iter()
            .zip(Segment::PROGRAM)
            .filter_map(|(region, segment)| Some((region.as_ref()?, segment)));
        for (region, segment) in program {
            if let Some(pa) = region.translate(va) {
                return Some(Translation { segment, pa });
            }
        }
        self.stack()
            .translate(va)
            .map(|pa| Translation {
                segment: Segment::Stack,
                pa,
            })
    }

    /// `copyout`: write `bytes` to user memory at `dst`.
    ///
    /// # Errors
    /// [`VmError::Unmapped`] if `dst` is not mapped, [`VmError::InvalidRange`]
    /// if the range does not fit in `dst`'s region.
    pub fn copy_out<M: PhysMapper + ?Sized, I: InterruptControl>(
        &self,
        mem: &PhysicalMemory<'_, M, I>,
        dst: VirtualAddress,
        bytes: &[u8],
    ) -> Result<(), VmError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let pa = self.span(dst, bytes.len())?;
        // Safety: the range lies in frames owned by this address space.
        unsafe { mem.write_bytes(pa, bytes) };
        Ok(())
    }

    /// `copyin`: fill `buf` from user memory at `src`.
    ///
    /// # Errors
    /// As for [`copy_out`](Self::copy_out).
    pub fn copy_in<M: PhysMapper + ?Sized, I: InterruptControl>(
        &self,
        mem: &PhysicalMemory<'_, M, I>,
        src: VirtualAddress,
        buf: &mut [u8],
    ) -> Result<(), VmError> {
        if buf.is_empty() {
            return Ok(());
        }
        let pa = self.span(src, buf.len())?;
        unsafe { mem.read_bytes(pa, buf) };
        Ok(())
    }

    /// Physical start of `[va, va + len)` if the whole range is in one segment.
    fn span(&self, va: VirtualAddress, len: usize) -> Result<PhysicalAddress, VmError> {
        let first = self.translate(va).ok_or(VmError::Unmapped(va))?;
        let last = u32::try_from(len - 1)
            .ok()
            .and_then(|n| va.checked_add(n))
            .and_then(|end| self.translate(end))
            .ok_or(VmError::InvalidRange(va))?;
        if last.segment != first.segment {
            return Err(VmError::InvalidRange(va));
        }
        Ok(first.pa)
    }

    fn has_frames(&self) -> bool {
        self.stack_pbase.is_some() || self.regions.iter().flatten().any(|r| r.pbase.is_some())
    }

    #[inline]
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Program region `index` (0 = text, 1 = data), if declared.
    #[must_use]
    pub fn region(&self, index: usize) -> Option<Region> {
        self.regions.get(index).copied().flatten()
    }

    /// The fixed stack region.
    #[must_use]
    pub const fn stack(&self) -> Region {
        Region {
            vbase: USER_STACK_BASE,
            npages: USER_STACK_PAGES,
            pbase: self.stack_pbase,
        }
    }
}
