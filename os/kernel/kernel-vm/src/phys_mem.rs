//! # Physical Memory
//!
//! The kernel's single owner of physical RAM. Allocation requests go to the
//! [`BootstrapStealer`] until [`PhysicalMemory::bootstrap`] retires it and
//! switches in the [`FrameAllocator`]; both live behind the one allocator
//! lock, so switching sources is the "allocator ready" publication.
//!
//! The lock is only ever taken with interrupts disabled, so an interrupt
//! handler that allocates cannot spin on a lock its own CPU already holds.

use crate::frame_alloc::{FrameAllocator, FrameStats};
use crate::error::LedgerError;
use crate::ledger::THREAD_STACK_MAGIC;
use crate::phys_mapper::{PhysMapper, kvaddr_to_paddr, paddr_to_kvaddr};
use crate::steal::BootstrapStealer;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_sync::{InterruptControl, IrqGuard, SpinLock};
use log::error;

enum FrameSource<'m> {
    Stealing(BootstrapStealer),
    Ready(FrameAllocator<'m>),
}

pub struct PhysicalMemory<'m, M: PhysMapper + ?Sized, I: InterruptControl> {
    mapper: &'m M,
    irq: I,
    source: SpinLock<FrameSource<'m>>,
}

impl<'m, M: PhysMapper + ?Sized, I: InterruptControl> PhysicalMemory<'m, M, I> {
    /// Take over the RAM range `[first_free, last)` left by the boot loader.
    ///
    /// # Safety
    /// The range must be RAM reachable through `mapper` and unused by anything
    /// else for as long as `'m`.
    #[must_use]
    pub const unsafe fn new(
        mapper: &'m M,
        irq: I,
        first_free: PhysicalAddress,
        last: PhysicalAddress,
    ) -> Self {
        Self {
            mapper,
            irq,
            source: SpinLock::new(FrameSource::Stealing(BootstrapStealer::new(first_free, last))),
        }
    }

    /// Carve the frame ledger out of the memory not yet stolen and switch
    /// all further allocation to the frame allocator.
    ///
    /// # Panics
    /// If called more than once.
    pub fn bootstrap(&self) {
        self.with_source(|source| {
            let FrameSource::Stealing(stealer) = source else {
                error!("frame allocator bootstrapped twice");
                panic!("frame allocator bootstrapped twice");
            };
            let (lo, hi) = stealer.remaining();
            // Safety: the stealer never returns frames at or above `lo`, and
            // retiring it hands `[lo, hi)` to the allocator alone.
            let alloc = unsafe { FrameAllocator::bootstrap(self.mapper, lo, hi) };
            *source = FrameSource::Ready(alloc);
        });
    }

    /// Run `f` on the frame source with interrupts off and the lock held.
    fn with_source<R>(&self, f: impl FnOnce(&mut FrameSource<'m>) -> R) -> R {
        let _irq = IrqGuard::new(&self.irq);
        self.source.with_lock(f)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.with_source(|source| matches!(source, FrameSource::Ready(_)))
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    #[inline]
    #[must_use]
    pub const fn interrupts(&self) -> &I {
        &self.irq
    }

    /// Allocate `npages` contiguous frames.
    ///
    /// Before bootstrap the frames are stolen (and exhaustion is fatal);
    /// afterwards a failed request returns `None` with nothing changed.
    #[must_use]
    pub fn alloc_frames(&self, npages: usize) -> Option<PhysicalAddress> {
        if npages == 0 {
            return None;
        }
        self.with_source(|source| match source {
            FrameSource::Stealing(stealer) => Some(stealer.steal(npages)),
            FrameSource::Ready(alloc) => alloc.allocate(npages),
        })
    }

    /// Free the run starting at `pa`. A no-op before bootstrap: stolen
    /// memory is never reclaimed.
    ///
    /// # Panics
    /// If the frame ledger detects a bad or double free.
    pub fn free_frames(&self, pa: PhysicalAddress) {
        self.with_source(|source| {
            if let FrameSource::Ready(alloc) = source {
                alloc.deallocate(pa);
            }
        });
    }

    /// `alloc_kpages`: like [`alloc_frames`](Self::alloc_frames), but returns
    /// the run's KSEG0 kernel virtual address.
    #[must_use]
    pub fn alloc_kpages(&self, npages: usize) -> Option<VirtualAddress> {
        self.alloc_frames(npages).map(paddr_to_kvaddr)
    }

    /// `free_kpages`: free a run previously returned by
    /// [`alloc_kpages`](Self::alloc_kpages).
    ///
    /// # Panics
    /// If `va` is not a KSEG0 address, or on a bad free.
    pub fn free_kpages(&self, va: VirtualAddress) {
        let Some(pa) = kvaddr_to_paddr(va) else {
            error!("free_kpages: {va} is not a direct-mapped kernel address");
            panic!("free_kpages: {va} is not a direct-mapped kernel address");
        };
        self.free_frames(pa);
    }

    /// Frame accounting; all zero before bootstrap.
    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.with_source(|source| match source {
            FrameSource::Stealing(_) => FrameStats::default(),
            FrameSource::Ready(alloc) => alloc.stats(),
        })
    }

    /// Walk the whole ledger and verify every run and the free count.
    ///
    /// # Errors
    /// The first inconsistency found.
    pub fn audit(&self) -> Result<FrameStats, LedgerError> {
        self.with_source(|source| match source {
            FrameSource::Stealing(_) => Ok(FrameStats::default()),
            FrameSource::Ready(alloc) => alloc.audit(),
        })
    }

    /// Place the thread-stack guard word at the bottom of the kernel stack
    /// run starting at `pa`, which also overwrites the run's recorded length.
    ///
    /// # Errors
    /// If `pa` is not the start of a live run. Stacks stolen during boot are
    /// not in the ledger and only get the guard word.
    ///
    /// # Safety
    /// `pa` must be a run the caller owns.
    pub unsafe fn mark_thread_stack(&self, pa: PhysicalAddress) -> Result<(), LedgerError> {
        self.with_source(|source| {
            if let FrameSource::Ready(alloc) = source {
                alloc.mark_stack_footer(pa)?;
            }
            unsafe {
                self.mapper
                    .phys_to_ptr(pa)
                    .cast::<u32>()
                    .write_unaligned(THREAD_STACK_MAGIC);
            }
            Ok(())
        })
    }

    /// Fill `npages` frames starting at `pa` with zeros.
    ///
    /// # Safety
    /// The frames must be owned by the caller.
    pub unsafe fn zero_frames(&self, pa: PhysicalAddress, npages: usize) {
        unsafe {
            core::ptr::write_bytes(self.mapper.phys_to_ptr(pa), 0, npages * PAGE_SIZE as usize);
        }
    }

    /// Copy `npages` frames from `src` to `dst`.
    ///
    /// # Safety
    /// Both runs must be owned by the caller and must not overlap.
    pub unsafe fn copy_frames(&self, dst: PhysicalAddress, src: PhysicalAddress, npages: usize) {
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.mapper.phys_to_ptr(src),
                self.mapper.phys_to_ptr(dst),
                npages * PAGE_SIZE as usize,
            );
        }
    }

    /// # Safety
    /// `[pa, pa + bytes.len())` must lie in frames owned by the caller.
    pub unsafe fn write_bytes(&self, pa: PhysicalAddress, bytes: &[u8]) {
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapper.phys_to_ptr(pa), bytes.len());
        }
    }

    /// # Safety
    /// `[pa, pa + buf.len())` must lie in frames owned by the caller.
    pub unsafe fn read_bytes(&self, pa: PhysicalAddress, buf: &mut [u8]) {
        unsafe {
            core::ptr::copy_nonoverlapping(self.mapper.phys_to_ptr(pa), buf.as_mut_ptr(), buf.len());
        }
    }
}
