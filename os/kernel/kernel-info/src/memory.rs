//! # Memory Layout

use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};

/// Start of the user segment.
pub const MIPS_KUSEG: u32 = 0x0000_0000;

/// Start of the cached, direct-mapped kernel segment.
///
/// Physical address `pa` is visible to the kernel at `MIPS_KSEG0 + pa`.
pub const MIPS_KSEG0: u32 = 0x8000_0000;

/// Start of the uncached, direct-mapped kernel segment (device registers).
pub const MIPS_KSEG1: u32 = 0xA000_0000;

/// Start of the TLB-mapped kernel segment. Unused by this VM system.
pub const MIPS_KSEG2: u32 = 0xC000_0000;

/// Size of the KSEG0 window, which bounds how much RAM the kernel can address.
pub const KSEG0_SIZE: u32 = MIPS_KSEG1 - MIPS_KSEG0;

/// End of user space; the first address user code cannot touch.
pub const USERSPACE_TOP: u32 = MIPS_KSEG0;

/// Initial user stack pointer. The stack grows down from here.
pub const USER_STACK_TOP: VirtualAddress = VirtualAddress::new(USERSPACE_TOP);

/// Every process gets exactly this many stack pages (48 KiB).
pub const USER_STACK_PAGES: usize = 12;

/// [`USER_STACK_PAGES`] in bytes.
#[allow(clippy::cast_possible_truncation)]
pub const USER_STACK_SIZE: u32 = USER_STACK_PAGES as u32 * PAGE_SIZE;

/// Lowest address of the user stack.
pub const USER_STACK_BASE: VirtualAddress = VirtualAddress::new(USERSPACE_TOP - USER_STACK_SIZE);

/// Maximum number of program regions (text, data) per address space.
pub const MAX_PROGRAM_REGIONS: usize = 2;

const _: () = {
    assert!(USER_STACK_SIZE == 48 * 1024);
    assert!(USER_STACK_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(USER_STACK_BASE.as_u32() < USER_STACK_TOP.as_u32());
    assert!(USERSPACE_TOP == MIPS_KSEG0);
    assert!(MIPS_KUSEG < MIPS_KSEG0 && MIPS_KSEG0 < MIPS_KSEG1 && MIPS_KSEG1 < MIPS_KSEG2);
};
