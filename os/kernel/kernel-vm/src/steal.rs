//! # Bootstrap-Only Frame Stealer
//!
//! A bump allocator over the RAM left free by the boot loader. It serves the
//! kernel's own early allocations until the frame ledger exists.
//!
//! ## WARNING
//!
//! - **Do not use after the frame allocator is online.** [`PhysicalMemory`]
//!   retires the stealer during bootstrap and hands its remaining range to the
//!   frame allocator.
//! - Never frees. Memory stolen here stays with its owner forever.
//!
//! [`PhysicalMemory`]: crate::PhysicalMemory

use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};
use log::error;

/// Monotonic cursor over `[next, end)`.
#[derive(Debug)]
pub struct BootstrapStealer {
    next: PhysicalAddress,
    end: PhysicalAddress,
}

impl BootstrapStealer {
    /// Claim the RAM range `[first_free, end)` reported by the boot loader.
    ///
    /// The start is rounded up and the end rounded down to frame boundaries.
    #[must_use]
    pub const fn new(first_free: PhysicalAddress, end: PhysicalAddress) -> Self {
        let end = end.align_down();
        let next = match first_free.checked_align_up() {
            Some(next) if next.as_u32() <= end.as_u32() => next,
            _ => end,
        };
        Self { next, end }
    }

    /// Take `npages` contiguous frames from the low end of the range.
    ///
    /// # Panics
    /// If fewer than `npages` frames remain. There is no way to recover from
    /// running out of memory this early in boot.
    pub fn steal(&mut self, npages: usize) -> PhysicalAddress {
        let Some(base) = self.try_steal(npages) else {
            error!(
                "bootstrap stealer exhausted: wanted {npages} frames, {} left",
                self.remaining_frames()
            );
            panic!("out of memory during bootstrap");
        };
        base
    }

    fn try_steal(&mut self, npages: usize) -> Option<PhysicalAddress> {
        let bytes = u32::try_from(npages).ok()?.checked_mul(PAGE_SIZE)?;
        let new_next = self.next.checked_add(bytes)?;
        if new_next > self.end {
            return None;
        }
        let base = self.next;
        self.next = new_next;
        Some(base)
    }

    /// The not-yet-stolen range `[lo, hi)`.
    #[must_use]
    pub const fn remaining(&self) -> (PhysicalAddress, PhysicalAddress) {
        (self.next, self.end)
    }

    #[must_use]
    pub const fn remaining_frames(&self) -> usize {
        ((self.end.as_u32() - self.next.as_u32()) / PAGE_SIZE) as usize
    }
}
