//! # Kernel Virtual Memory
//!
//! The VM system of a uniprocessor MIPS kernel with a software-managed TLB.
//! Memory is never paged: every program is loaded whole into physically
//! contiguous regions, and a TLB miss is resolved by a subtraction and an
//! addition.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Vm                                                     │
//! │   vm_bootstrap · alloc_kpages · vm_fault · as_*        │
//! └──────┬──────────────────────────────┬──────────────────┘
//!        │                              │
//! ┌──────▼──────────────────┐   ┌───────▼──────────────────┐
//! │ AddressSpace            │   │ Mmu                      │
//! │   text · data · stack   │──►│   TLB slots, interrupts  │
//! └──────┬──────────────────┘   └──────────────────────────┘
//!        │
//! ┌──────▼─────────────────────────────────────────────────┐
//! │ PhysicalMemory (one SpinLock)                          │
//! │   BootstrapStealer ──vm_bootstrap──► FrameAllocator    │
//! │                                      └─ Ledger         │
//! └──────┬─────────────────────────────────────────────────┘
//!        │
//! ┌──────▼──────────────────┐
//! │ PhysMapper (KSEG0)      │
//! └─────────────────────────┘
//! ```
//!
//! ## Errors
//!
//! Recoverable conditions come back as [`VmError`] and map onto kernel error
//! numbers. Corruption of the frame ledger is a kernel bug and panics after
//! logging the [`LedgerError`].
//!
//! ## Testing
//!
//! The `sim` feature adds the `sim` module, which provides RAM, a TLB and an
//! interrupt flag in software:
//!
//! ```rust
//! use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
//! use kernel_vm::sim::{SimInterrupts, SimRam, SimTlb};
//! use kernel_vm::{AddressSpace, Permissions, Vm};
//!
//! let ram = SimRam::new(256);
//! let vm = unsafe {
//!     Vm::new(&ram, PhysicalAddress::new(0x1_0000), ram.end(), SimTlb::new(1), SimInterrupts::new())
//! };
//! vm.bootstrap();
//!
//! let mut aspace = AddressSpace::new();
//! aspace
//!     .define_region(VirtualAddress::new(0x0040_0000), 0x2000, Permissions::new().with_read(true))
//!     .unwrap();
//! vm.as_prepare_load(&mut aspace).unwrap();
//! let sp = aspace.define_stack();
//! vm.as_complete_load(&mut aspace);
//!
//! assert_eq!(vm.fault_errno(Some(&aspace), 0, 0x0040_1004), 0);
//! assert_eq!(vm.fault_errno(Some(&aspace), 0, sp.as_u32() - 4), 0);
//! vm.as_destroy(aspace);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod address_space;
pub mod error;
pub mod fault;
pub mod frame_alloc;
pub mod ledger;
pub mod phys_mapper;
mod phys_mem;
#[cfg(feature = "sim")]
pub mod sim;
pub mod steal;
pub mod tlb;
mod vm;

pub use address_space::{AddressSpace, Permissions, Region, Segment, Translation};
pub use error::{Errno, LedgerError, VmError};
pub use fault::{FaultKind, Resolution, handle_tlb_miss};
pub use frame_alloc::{FrameAllocator, FrameStats};
pub use phys_mapper::{Kseg0PhysMapper, PhysMapper, kvaddr_to_paddr, paddr_to_kvaddr};
pub use phys_mem::PhysicalMemory;
pub use tlb::{Mmu, NUM_TLB, TlbEntry, TlbHardware};
pub use vm::Vm;
