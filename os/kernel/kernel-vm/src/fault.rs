//! # TLB Miss Handling
//!
//! Every user access that misses the TLB traps here. The handler looks the
//! address up in the current [`AddressSpace`] and loads the mapping into the
//! TLB; nothing is ever paged in, so a miss either resolves immediately or
//! kills the process.

use crate::address_space::{AddressSpace, Segment};
use crate::error::VmError;
use crate::tlb::{Mmu, Placement, TlbHardware};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_sync::InterruptControl;
use log::debug;

/// Cause of a TLB exception, as delivered by the trap code.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FaultKind {
    /// `VM_FAULT_READ`: load from a page with no TLB entry.
    Read = 0,
    /// `VM_FAULT_WRITE`: store to a page with no TLB entry.
    Write = 1,
    /// `VM_FAULT_READONLY`: store through a clean (non-dirty) TLB entry.
    ReadOnly = 2,
}

impl TryFrom<u32> for FaultKind {
    type Error = VmError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            2 => Ok(Self::ReadOnly),
            other => Err(VmError::InvalidFaultType(other)),
        }
    }
}

/// What a resolved miss put into the TLB.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Resolution {
    pub page: VirtualAddress,
    pub frame: PhysicalAddress,
    pub segment: Segment,
    pub dirty: bool,
    pub placement: Placement,
}

/// Resolve a TLB miss at `addr` for the address space `aspace`.
///
/// # Errors
/// - [`VmError::ReadOnly`]: a store hit a clean page, which only happens to
///   program text after loading finished.
/// - [`VmError::NoAddressSpace`]: the fault came from a context with no user
///   address space (a kernel bug during boot).
/// - [`VmError::Unmapped`]: `addr` is outside every region.
///
/// The first and last kill the process; see [`VmError::terminates_process`].
pub fn handle_tlb_miss<T: TlbHardware, I: InterruptControl>(
    mmu: &Mmu<T, I>,
    aspace: Option<&AddressSpace>,
    kind: FaultKind,
    addr: VirtualAddress,
) -> Result<Resolution, VmError> {
    let page = addr.align_down();
    debug!("fault: {kind:?} at {addr}");

    if kind == FaultKind::ReadOnly {
        return Err(VmError::ReadOnly(page));
    }
    let aspace = aspace.ok_or(VmError::NoAddressSpace)?;
    let translation = aspace.translate(page).ok_or(VmError::Unmapped(addr))?;

    let dirty = !(translation.segment == Segment::Text && aspace.is_loaded());
    let placement = mmu.install(page, translation.pa, dirty);
    debug!("fault: {page} -> {} ({:?}, dirty={dirty})", translation.pa, translation.segment);

    Ok(Resolution {
        page,
        frame: translation.pa,
        segment: translation.segment,
        dirty,
        placement,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_fault_types() {
        assert_eq!(FaultKind::try_from(0), Ok(FaultKind::Read));
        assert_eq!(FaultKind::try_from(1), Ok(FaultKind::Write));
        assert_eq!(FaultKind::try_from(2), Ok(FaultKind::ReadOnly));
        assert_eq!(FaultKind::try_from(3), Err(VmError::InvalidFaultType(3)));
        assert_eq!(FaultKind::Write as u32, 1);
    }
}
