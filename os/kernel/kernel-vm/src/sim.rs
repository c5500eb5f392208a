//! # Software Machine
//!
//! Stand-ins for the hardware the VM system drives, so the allocator, the
//! address-space code and the fault handler run unchanged on a development
//! host: [`SimRam`] for physical memory, [`SimTlb`] for the translation buffer
//! and [`SimInterrupts`] for the interrupt-enable bit.

extern crate alloc;

use crate::phys_mapper::PhysMapper;
use crate::tlb::{NUM_TLB, TlbEntry, TlbHardware};
use alloc::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use alloc::sync::Arc;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_sync::{InterruptControl, SpinLock};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Zero-filled, page-aligned heap block posing as physical RAM starting at
/// physical address 0.
pub struct SimRam {
    base: NonNull<u8>,
    layout: Layout,
}

// Safety: SimRam only hands out raw pointers; synchronizing access to the
// bytes is the caller's business, exactly as with real RAM.
unsafe impl Send for SimRam {}
unsafe impl Sync for SimRam {}

impl SimRam {
    /// # Panics
    /// If `frames` is zero.
    #[must_use]
    pub fn new(frames: usize) -> Self {
        assert!(frames > 0, "SimRam needs at least one frame");
        let Ok(layout) = Layout::from_size_align(frames * PAGE_SIZE as usize, PAGE_SIZE as usize)
        else {
            panic!("SimRam of {frames} frames is too large");
        };
        // Safety: the layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(base) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };
        Self { base, layout }
    }

    /// One past the last simulated physical address.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.layout.size() as u32)
    }
}

impl PhysMapper for SimRam {
    unsafe fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        assert!(
            pa.as_usize() < self.layout.size(),
            "{pa:?} is outside simulated RAM"
        );
        unsafe { self.base.as_ptr().add(pa.as_usize()) }
    }
}

impl Drop for SimRam {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
    }
}

struct TlbState {
    slots: [TlbEntry; NUM_TLB],
    rng: SmallRng,
    random_writes: usize,
}

/// 64-slot translation buffer. `write_random` picks its victim with a seeded
/// generator, so tests are reproducible.
pub struct SimTlb {
    state: SpinLock<TlbState>,
}

impl SimTlb {
    /// A TLB with every slot invalid.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            state: SpinLock::new(TlbState {
                slots: core::array::from_fn(TlbEntry::invalid),
                rng: SmallRng::seed_from_u64(seed),
                random_writes: 0,
            }),
        }
    }

    /// Snapshot of every slot.
    #[must_use]
    pub fn entries(&self) -> [TlbEntry; NUM_TLB] {
        self.state.with_lock(|s| s.slots)
    }

    /// The valid entry that translates `va`, if any.
    #[must_use]
    pub fn probe(&self, va: VirtualAddress) -> Option<TlbEntry> {
        let vpn = va.page_number();
        self.state.with_lock(|s| {
            s.slots
                .iter()
                .copied()
                .find(|e| e.is_valid() && e.hi.vpn() == vpn)
        })
    }

    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.state
            .with_lock(|s| s.slots.iter().filter(|e| e.is_valid()).count())
    }

    /// How many entries went through `write_random`.
    #[must_use]
    pub fn random_writes(&self) -> usize {
        self.state.with_lock(|s| s.random_writes)
    }
}

impl TlbHardware for SimTlb {
    fn read(&self, slot: usize) -> TlbEntry {
        self.state.with_lock(|s| s.slots[slot])
    }

    fn write(&self, entry: TlbEntry, slot: usize) {
        self.state.with_lock(|s| s.slots[slot] = entry);
    }

    fn write_random(&self, entry: TlbEntry) {
        self.state.with_lock(|s| {
            let slot = s.rng.random_range(0..NUM_TLB);
            s.slots[slot] = entry;
            s.random_writes += 1;
        });
    }
}

/// Interrupt-enable flag that starts out enabled and counts `disable` calls.
/// Clones share the one flag, like every handle on the same CPU.
#[derive(Debug, Clone, Default)]
pub struct SimInterrupts {
    state: Arc<IrqState>,
}

#[derive(Debug)]
struct IrqState {
    enabled: AtomicBool,
    disables: AtomicUsize,
}

impl Default for IrqState {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            disables: AtomicUsize::new(0),
        }
    }
}

impl SimInterrupts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn disable_count(&self) -> usize {
        self.state.disables.load(Ordering::SeqCst)
    }
}

impl InterruptControl for SimInterrupts {
    fn disable(&self) -> bool {
        self.state.disables.fetch_add(1, Ordering::SeqCst);
        self.state.enabled.swap(false, Ordering::SeqCst)
    }

    fn enable(&self) {
        self.state.enabled.store(true, Ordering::SeqCst);
    }
}
