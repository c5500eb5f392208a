//! # Frame ledger
//!
//! One [`LedgerEntry`] per managed physical frame. A run of `N` frames handed
//! out by a single allocation is recorded as
//!
//! ```text
//! frame:   s        s+1            s+2            ...  s+N-1
//! entry:   Start(N) Continuation(2) Continuation(3) ... Continuation(N)
//! ```
//!
//! so the length of a run can be read from its first frame alone, and freeing
//! can re-derive the run by walking forward while positions increase by one.
//! Comparing the two is the allocator's double-free / overwrite detector.
//!
//! The entries are tagged: a `RunStart` can never be mistaken for the
//! continuation of the run in front of it, even when two runs are adjacent.

use crate::error::LedgerError;

/// Marker the kernel places at the bottom of every kernel thread stack.
///
/// When the marker lands on a run's first ledger entry the run's declared
/// length is lost; [`Ledger::release_run`] tolerates that one case.
pub const THREAD_STACK_MAGIC: u32 = 0xbaad_f00d;

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum LedgerEntry {
    #[default]
    Free,
    /// First frame of a run of `len` frames.
    RunStart { len: u32 },
    /// The frame at 1-based `position` within its run (`2..=len`).
    Continuation { position: u32 },
    /// A run start whose length was overwritten by [`THREAD_STACK_MAGIC`].
    StackFooter,
}

impl LedgerEntry {
    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

/// Outcome of freeing one run.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Released {
    /// Length recorded at allocation time, `None` for a stack-footer run.
    pub declared: Option<usize>,
    /// Frames actually returned to the free state.
    pub cleared: usize,
}

/// Result of a full ledger walk.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct Census {
    pub free: usize,
    pub used: usize,
    pub runs: usize,
}

/// The ledger proper: a borrowed slice with one entry per frame.
pub struct Ledger<'m> {
    entries: &'m mut [LedgerEntry],
}

impl<'m> Ledger<'m> {
    /// Take over `entries` and mark every frame free.
    pub fn new(entries: &'m mut [LedgerEntry]) -> Self {
        entries.fill(LedgerEntry::Free);
        Self { entries }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn entry(&self, frame: usize) -> Option<LedgerEntry> {
        self.entries.get(frame).copied()
    }

    /// First-fit search for `npages` consecutive free frames.
    #[must_use]
    pub fn find_gap(&self, npages: usize) -> Option<usize> {
        if npages == 0 {
            return None;
        }
        let mut start = 0;
        let mut found = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            if !entry.is_free() {
                found = 0;
                continue;
            }
            if found == 0 {
                start = i;
            }
            found += 1;
            if found == npages {
                return Some(start);
            }
        }
        None
    }

    /// Record an allocated run. The frames must be free.
    #[allow(clippy::cast_possible_truncation)]
    pub fn mark_run(&mut self, start: usize, npages: usize) {
        let run = &mut self.entries[start..start + npages];
        debug_assert!(run.iter().all(|e| e.is_free()), "marking a frame that is in use");

        // A ledger never spans more than 2^20 frames, so positions fit a u32.
        run[0] = LedgerEntry::RunStart { len: npages as u32 };
        for (i, entry) in run.iter_mut().enumerate().skip(1) {
            *entry = LedgerEntry::Continuation {
                position: i as u32 + 1,
            };
        }
    }

    /// Free the run starting at `start` by walking its continuation entries.
    ///
    /// # Errors
    /// Any [`LedgerError`] here means the ledger is corrupt; the caller must
    /// treat it as fatal.
    pub fn release_run(&mut self, start: usize) -> Result<Released, LedgerError> {
        let declared = match self.entries[start] {
            LedgerEntry::Free => return Err(LedgerError::DoubleFree { frame: start }),
            LedgerEntry::Continuation { .. } => {
                return Err(LedgerError::NotRunStart { frame: start });
            }
            LedgerEntry::RunStart { len } => Some(len as usize),
            LedgerEntry::StackFooter => None,
        };

        self.entries[start] = LedgerEntry::Free;
        let mut cleared = 1;
        let mut last = 1;
        for entry in &mut self.entries[start + 1..] {
            if *entry != (LedgerEntry::Continuation { position: last + 1 }) {
                break;
            }
            *entry = LedgerEntry::Free;
            last += 1;
            cleared += 1;
        }

        if let Some(declared) = declared
            && declared != cleared
        {
            return Err(LedgerError::LengthMismatch {
                frame: start,
                declared,
                cleared,
            });
        }
        Ok(Released { declared, cleared })
    }

    /// Overwrite the run start at `start` with the thread-stack footer marker.
    ///
    /// # Errors
    /// If `start` is not the first frame of an allocated run.
    pub fn stamp_stack_footer(&mut self, start: usize) -> Result<(), LedgerError> {
        match self.entries[start] {
            LedgerEntry::RunStart { .. } | LedgerEntry::StackFooter => {
                self.entries[start] = LedgerEntry::StackFooter;
                Ok(())
            }
            LedgerEntry::Free => Err(LedgerError::DoubleFree { frame: start }),
            LedgerEntry::Continuation { .. } => Err(LedgerError::NotRunStart { frame: start }),
        }
    }

    /// Walk every entry and check the run encoding.
    ///
    /// # Errors
    /// The first inconsistency found.
    pub fn audit(&self) -> Result<Census, LedgerError> {
        let mut census = Census::default();
        let mut frame = 0;
        while frame < self.entries.len() {
            let declared = match self.entries[frame] {
                LedgerEntry::Free => {
                    census.free += 1;
                    frame += 1;
                    continue;
                }
                LedgerEntry::Continuation { .. } => {
                    return Err(LedgerError::StrayContinuation { frame });
                }
                LedgerEntry::RunStart { len } => Some(len as usize),
                LedgerEntry::StackFooter => None,
            };

            let found = 1 + self.continuations_after(frame);
            if let Some(declared) = declared
                && declared != found
            {
                return Err(if frame + found == self.entries.len() && found < declared {
                    LedgerError::TruncatedRun {
                        frame,
                        declared,
                        found,
                    }
                } else {
                    LedgerError::LengthMismatch {
                        frame,
                        declared,
                        cleared: found,
                    }
                });
            }

            census.used += found;
            census.runs += 1;
            frame += found;
        }
        Ok(census)
    }

    fn continuations_after(&self, start: usize) -> usize {
        self.entries[start + 1..]
            .iter()
            .zip(2..)
            .take_while(|&(entry, position)| *entry == LedgerEntry::Continuation { position })
            .count()
    }
}
