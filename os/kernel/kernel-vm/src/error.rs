//! Error types of the VM system.
//!
//! Two families, matching how the kernel reacts:
//!
//! - [`VmError`] is returned to the caller. Resource exhaustion and bad
//!   arguments bubble up as error codes; access faults additionally kill the
//!   faulting process (see [`VmError::terminates_process`]).
//! - [`LedgerError`] describes a corrupted frame ledger. It is never returned:
//!   the allocator panics with it, because continuing would hand out frames
//!   that are still owned by someone.

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Numeric kernel error codes, as returned across the C-style `vm_fault` /
/// `as_*` boundary.
#[repr(i32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Errno {
    /// `EUNIMP`: unimplemented feature.
    Unimplemented = 2,
    /// `ENOMEM`: out of memory.
    OutOfMemory = 3,
    /// `EFAULT`: bad memory reference.
    BadAddress = 6,
    /// `EINVAL`: invalid argument.
    InvalidArgument = 8,
}

impl Errno {
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("out of physical memory")]
    OutOfMemory,
    #[error("unknown fault type {0}")]
    InvalidFaultType(u32),
    #[error("address space already holds two program regions")]
    TooManyRegions,
    #[error("no address space bound to the faulting context")]
    NoAddressSpace,
    #[error("access to unmapped address {0}")]
    Unmapped(VirtualAddress),
    #[error("write to read-only page at {0}")]
    ReadOnly(VirtualAddress),
    #[error("user range starting at {0} leaves its region")]
    InvalidRange(VirtualAddress),
}

impl VmError {
    /// The kernel error code reported for this error.
    #[must_use]
    pub const fn errno(self) -> Errno {
        match self {
            Self::OutOfMemory => Errno::OutOfMemory,
            Self::InvalidFaultType(_) => Errno::InvalidArgument,
            Self::TooManyRegions => Errno::Unimplemented,
            Self::NoAddressSpace
            | Self::Unmapped(_)
            | Self::ReadOnly(_)
            | Self::InvalidRange(_) => Errno::BadAddress,
        }
    }

    /// Whether the process that caused the error must be terminated.
    ///
    /// Only true for faults raised by a user access; out-of-memory and
    /// argument errors are reported to the process instead.
    #[must_use]
    pub const fn terminates_process(self) -> bool {
        matches!(
            self,
            Self::NoAddressSpace | Self::Unmapped(_) | Self::ReadOnly(_)
        )
    }
}

/// Frame ledger integrity violations. See the module docs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("frame {frame} freed but not allocated (double free?)")]
    DoubleFree { frame: usize },
    #[error("frame {frame} freed but is in the middle of a run")]
    NotRunStart { frame: usize },
    #[error("run at frame {frame} declared {declared} frames but {cleared} were contiguous")]
    LengthMismatch {
        frame: usize,
        declared: usize,
        cleared: usize,
    },
    #[error("frame {frame} continues a run that never started")]
    StrayContinuation { frame: usize },
    #[error("run at frame {frame} declared {declared} frames but the ledger ends after {found}")]
    TruncatedRun {
        frame: usize,
        declared: usize,
        found: usize,
    },
    #[error("ledger counts {counted} free frames but the allocator recorded {recorded}")]
    FreeCountMismatch { counted: usize, recorded: usize },
    #[error("{0} is outside the managed frame pool")]
    OutsidePool(PhysicalAddress),
    #[error("{0} is not frame aligned")]
    Unaligned(PhysicalAddress),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_values_match_kernel_headers() {
        assert_eq!(Errno::Unimplemented.as_i32(), 2);
        assert_eq!(Errno::OutOfMemory.as_i32(), 3);
        assert_eq!(Errno::BadAddress.as_i32(), 6);
        assert_eq!(Errno::InvalidArgument.as_i32(), 8);
    }

    #[test]
    fn classification() {
        let va = VirtualAddress::new(0x3500);
        assert_eq!(VmError::Unmapped(va).errno(), Errno::BadAddress);
        assert!(VmError::Unmapped(va).terminates_process());
        assert!(VmError::ReadOnly(va).terminates_process());
        assert!(VmError::NoAddressSpace.terminates_process());

        assert_eq!(VmError::InvalidFaultType(7).errno(), Errno::InvalidArgument);
        assert!(!VmError::InvalidFaultType(7).terminates_process());
        assert_eq!(VmError::TooManyRegions.errno(), Errno::Unimplemented);
        assert!(!VmError::OutOfMemory.terminates_process());
        assert!(!VmError::InvalidRange(va).terminates_process());
    }
}
