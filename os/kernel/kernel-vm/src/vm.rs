//! # The VM System
//!
//! [`Vm`] bundles physical memory and the MMU into the interface the rest of
//! the kernel calls: `vm_bootstrap`, `alloc_kpages` / `free_kpages`,
//! `vm_fault` and the `as_*` operations that need the allocator or the TLB.
//! Purely descriptive operations (`as_create`, `as_define_region`,
//! `as_define_stack`, `as_deactivate`) are [`AddressSpace`] methods. The kernel
//! holds exactly one `Vm`.

use crate::address_space::AddressSpace;
use crate::error::VmError;
use crate::fault::{FaultKind, Resolution, handle_tlb_miss};
use crate::frame_alloc::FrameStats;
use crate::phys_mapper::PhysMapper;
use crate::phys_mem::PhysicalMemory;
use crate::tlb::{Mmu, TlbHardware};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_sync::InterruptControl;
use log::error;

pub struct Vm<'m, M: PhysMapper + ?Sized, T, I: InterruptControl> {
    mem: PhysicalMemory<'m, M, I>,
    mmu: Mmu<T, I>,
}

impl<'m, M, T, I> Vm<'m, M, T, I>
where
    M: PhysMapper + ?Sized,
    T: TlbHardware,
    I: InterruptControl + Clone,
{
    /// The allocator lock and the TLB each mask interrupts through their own
    /// handle on `irq`.
    ///
    /// # Safety
    /// `[first_free, last)` must be RAM reachable through `mapper` that
    /// nothing else uses for as long as `'m`.
    pub unsafe fn new(
        mapper: &'m M,
        first_free: PhysicalAddress,
        last: PhysicalAddress,
        tlb: T,
        irq: I,
    ) -> Self {
        Self {
            mem: unsafe { PhysicalMemory::new(mapper, irq.clone(), first_free, last) },
            mmu: Mmu::new(tlb, irq),
        }
    }

    /// `vm_bootstrap`: bring the frame allocator online. Runs once.
    pub fn bootstrap(&self) {
        self.mem.bootstrap();
    }

    #[inline]
    #[must_use]
    pub const fn memory(&self) -> &PhysicalMemory<'m, M, I> {
        &self.mem
    }

    #[inline]
    #[must_use]
    pub const fn mmu(&self) -> &Mmu<T, I> {
        &self.mmu
    }

    #[must_use]
    pub fn alloc_kpages(&self, npages: usize) -> Option<VirtualAddress> {
        self.mem.alloc_kpages(npages)
    }

    pub fn free_kpages(&self, va: VirtualAddress) {
        self.mem.free_kpages(va);
    }

    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.mem.stats()
    }

    /// `vm_fault`: resolve a TLB exception of raw type `fault_type` at
    /// `fault_address` for the current process's address space.
    ///
    /// # Errors
    /// [`VmError::InvalidFaultType`] for an unknown type, otherwise as
    /// [`handle_tlb_miss`].
    pub fn fault(
        &self,
        aspace: Option<&AddressSpace>,
        fault_type: u32,
        fault_address: u32,
    ) -> Result<Resolution, VmError> {
        let kind = FaultKind::try_from(fault_type)?;
        handle_tlb_miss(&self.mmu, aspace, kind, VirtualAddress::new(fault_address))
    }

    /// [`fault`](Self::fault) with the trap code's return convention: 0 on
    /// success, an error number otherwise.
    #[must_use]
    pub fn fault_errno(
        &self,
        aspace: Option<&AddressSpace>,
        fault_type: u32,
        fault_address: u32,
    ) -> i32 {
        match self.fault(aspace, fault_type, fault_address) {
            Ok(_) => 0,
            Err(e) => e.errno().as_i32(),
        }
    }

    /// `vm_tlbshootdown_all`: a uniprocessor kernel never asks for one.
    ///
    /// # Panics
    /// Always.
    #[allow(clippy::unused_self)]
    pub fn tlb_shootdown_all(&self) -> ! {
        error!("vm: tlb shootdown requested on a uniprocessor");
        panic!("vm: tlb shootdown is not supported");
    }

    /// `vm_tlbshootdown` for the page containing `va`.
    ///
    /// # Panics
    /// Always.
    #[allow(clippy::unused_self)]
    pub fn tlb_shootdown(&self, va: VirtualAddress) -> ! {
        error!("vm: tlb shootdown of {va} requested on a uniprocessor");
        panic!("vm: tlb shootdown is not supported");
    }

    /// # Errors
    /// [`VmError::OutOfMemory`].
    pub fn as_prepare_load(&self, aspace: &mut AddressSpace) -> Result<(), VmError> {
        aspace.prepare_load(&self.mem)
    }

    pub fn as_complete_load(&self, aspace: &mut AddressSpace) {
        aspace.complete_load(&self.mmu);
    }

    /// # Errors
    /// [`VmError::OutOfMemory`].
    pub fn as_copy(&self, aspace: &AddressSpace) -> Result<AddressSpace, VmError> {
        aspace.copy(&self.mem)
    }

    pub fn as_destroy(&self, aspace: AddressSpace) {
        aspace.destroy(&self.mem);
    }

    /// Switch to the current process's address space. Kernel threads have
    /// none and keep whatever the TLB holds.
    pub fn as_activate(&self, aspace: Option<&AddressSpace>) {
        if let Some(aspace) = aspace {
            aspace.activate(&self.mmu);
        }
    }
}
