//! # Physical Frame Allocator
//!
//! First-fit allocator over the frame pool that is left after boot-time
//! stealing. Bookkeeping lives in a [`Ledger`] stored in the lowest frames of
//! the pool itself:
//!
//! ```text
//! lo                    base                                        end
//! ├── ledger frames ────┼── managed frames (one entry each) ─────────┤
//! ```
//!
//! The allocator itself is not synchronized; [`PhysicalMemory`] wraps it in
//! the single allocator lock.
//!
//! [`PhysicalMemory`]: crate::PhysicalMemory

use crate::error::LedgerError;
use crate::ledger::{Ledger, LedgerEntry, Released};
use crate::phys_mapper::PhysMapper;
use core::mem::size_of;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};
use log::{error, info, warn};

/// Point-in-time frame accounting.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct FrameStats {
    /// Frames under ledger control.
    pub total: usize,
    pub free: usize,
    pub used: usize,
    /// Live allocations.
    pub runs: usize,
}

pub struct FrameAllocator<'m> {
    /// First managed frame.
    base: PhysicalAddress,
    /// One past the last managed frame.
    end: PhysicalAddress,
    ledger: Ledger<'m>,
    free: usize,
    runs: usize,
}

/// Number of frames at the bottom of a `total`-frame pool needed to hold the
/// ledger for the remaining frames.
#[must_use]
pub const fn ledger_frames_for(total: usize) -> usize {
    let entry = size_of::<LedgerEntry>();
    (total * entry).div_ceil(PAGE_SIZE as usize + entry)
}

impl<'m> FrameAllocator<'m> {
    /// Manage `entries.len()` frames starting at `base`, all initially free.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_ledger(entries: &'m mut [LedgerEntry], base: PhysicalAddress) -> Self {
        debug_assert!(base.is_page_aligned());
        let total = entries.len();
        Self {
            base,
            end: base + total as u32 * PAGE_SIZE,
            ledger: Ledger::new(entries),
            free: total,
            runs: 0,
        }
    }

    /// Build the allocator over `[lo, hi)`, placing the ledger at `lo`.
    ///
    /// # Safety
    /// `[lo, hi)` must be RAM reachable through `mapper` that nobody else
    /// uses for as long as `'m`.
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn bootstrap<M: PhysMapper + ?Sized>(
        mapper: &'m M,
        lo: PhysicalAddress,
        hi: PhysicalAddress,
    ) -> Self {
        let hi = hi.align_down();
        let lo = match lo.checked_align_up() {
            Some(lo) if lo < hi => lo,
            _ => hi,
        };
        let total = ((hi.as_u32() - lo.as_u32()) / PAGE_SIZE) as usize;
        let ledger_frames = ledger_frames_for(total);
        let managed = total - ledger_frames;
        let base = lo + ledger_frames as u32 * PAGE_SIZE;

        let entries = unsafe {
            let ptr = mapper.phys_to_ptr(lo).cast::<LedgerEntry>();
            debug_assert!(ptr.is_aligned());
            for i in 0..managed {
                ptr.add(i).write(LedgerEntry::Free);
            }
            core::slice::from_raw_parts_mut(ptr, managed)
        };

        info!(
            "frame allocator: pool {lo}..{hi}, {ledger_frames} ledger frames, {managed} frames managed from {base}"
        );
        Self::with_ledger(entries, base)
    }

    /// Claim `npages` contiguous frames, first fit from the pool base.
    ///
    /// Returns `None` for a zero-sized request or when no gap is large
    /// enough. The ledger is left untouched on failure.
    #[allow(clippy::cast_possible_truncation)]
    pub fn allocate(&mut self, npages: usize) -> Option<PhysicalAddress> {
        if npages == 0 || npages > self.free {
            return None;
        }
        let start = self.ledger.find_gap(npages)?;
        self.ledger.mark_run(start, npages);
        self.free -= npages;
        self.runs += 1;
        Some(self.base + start as u32 * PAGE_SIZE)
    }

    /// Return the run starting at `pa` to the pool. Returns the number of
    /// frames released.
    ///
    /// The null address is ignored. Frames below the pool were stolen during
    /// boot and are never reclaimed.
    ///
    /// # Panics
    /// If `pa` is not the start of a live run, or the run's encoding is
    /// damaged.
    pub fn deallocate(&mut self, pa: PhysicalAddress) -> usize {
        if pa.is_null() {
            return 0;
        }
        if pa < self.base {
            warn!("ignoring free of {pa}: stolen during boot, below the frame pool");
            return 0;
        }

        let released = match self
            .frame_index(pa)
            .and_then(|frame| self.ledger.release_run(frame))
        {
            Ok(released) => released,
            Err(e) => corrupt(e),
        };
        if let Released {
            declared: None,
            cleared,
        } = released
        {
            warn!("run at {pa} carries the thread-stack footer; released {cleared} contiguous frames");
        }

        self.free += released.cleared;
        self.runs -= 1;
        released.cleared
    }

    /// Replace the length of the run at `pa` with the thread-stack footer.
    ///
    /// # Errors
    /// If `pa` is not the start of a live run in this pool.
    pub fn mark_stack_footer(&mut self, pa: PhysicalAddress) -> Result<(), LedgerError> {
        let frame = self.frame_index(pa)?;
        self.ledger.stamp_stack_footer(frame)
    }

    #[must_use]
    pub const fn stats(&self) -> FrameStats {
        let total = self.ledger.len();
        FrameStats {
            total,
            free: self.free,
            used: total - self.free,
            runs: self.runs,
        }
    }

    /// Re-walk the whole ledger and cross-check it against the counters.
    ///
    /// # Errors
    /// The first inconsistency found.
    pub fn audit(&self) -> Result<FrameStats, LedgerError> {
        let census = self.ledger.audit()?;
        if census.free != self.free {
            return Err(LedgerError::FreeCountMismatch {
                counted: census.free,
                recorded: self.free,
            });
        }
        Ok(FrameStats {
            total: self.ledger.len(),
            free: census.free,
            used: census.used,
            runs: census.runs,
        })
    }

    /// Managed range `[base, end)`.
    #[must_use]
    pub const fn pool(&self) -> (PhysicalAddress, PhysicalAddress) {
        (self.base, self.end)
    }

    #[must_use]
    pub fn contains(&self, pa: PhysicalAddress) -> bool {
        self.base <= pa && pa < self.end
    }

    /// Declared length of the run starting at `pa`, if one starts there.
    #[must_use]
    pub fn run_length(&self, pa: PhysicalAddress) -> Option<usize> {
        let frame = self.frame_index(pa).ok()?;
        match self.ledger.entry(frame)? {
            LedgerEntry::RunStart { len } => Some(len as usize),
            _ => None,
        }
    }

    fn frame_index(&self, pa: PhysicalAddress) -> Result<usize, LedgerError> {
        if !pa.is_page_aligned() {
            return Err(LedgerError::Unaligned(pa));
        }
        if !self.contains(pa) {
            return Err(LedgerError::OutsidePool(pa));
        }
        let offset = pa.offset_from(self.base).ok_or(LedgerError::OutsidePool(pa))?;
        Ok((offset / PAGE_SIZE) as usize)
    }
}

/// Ledger corruption is unrecoverable: continuing would hand out frames that
/// are still owned.
#[cold]
#[track_caller]
fn corrupt(err: LedgerError) -> ! {
    error!("frame ledger corrupt: {err}");
    panic!("frame ledger corrupt: {err}");
}
