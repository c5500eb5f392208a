use kernel_info::memory::{USER_STACK_BASE, USER_STACK_TOP};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_vm::sim::{SimInterrupts, SimRam, SimTlb};
use kernel_vm::tlb::Placement;
use kernel_vm::{AddressSpace, Errno, NUM_TLB, Permissions, Segment, Vm, VmError};

type SimVm<'m> = Vm<'m, SimRam, SimTlb, SimInterrupts>;

const READ: u32 = 0;
const WRITE: u32 = 1;
const READONLY: u32 = 2;

fn boot(ram: &SimRam) -> SimVm<'_> {
    let vm = unsafe {
        Vm::new(
            ram,
            PhysicalAddress::new(0x1_0000),
            ram.end(),
            SimTlb::new(0xdead_beef),
            SimInterrupts::new(),
        )
    };
    vm.bootstrap();
    vm
}

/// Region 1 at `[0x1000, 0x2000)`, region 2 at `[0x2000, 0x3000)`.
fn two_page_program(vm: &SimVm<'_>) -> AddressSpace {
    let perms = Permissions::new().with_read(true).with_write(true);
    let mut aspace = AddressSpace::new();
    aspace.define_region(VirtualAddress::new(0x1000), PAGE_SIZE, perms).unwrap();
    aspace.define_region(VirtualAddress::new(0x2000), PAGE_SIZE, perms).unwrap();
    vm.as_prepare_load(&mut aspace).unwrap();
    aspace
}

#[test]
fn faults_resolve_by_region() {
    let ram = SimRam::new(128);
    let vm = boot(&ram);
    let aspace = two_page_program(&vm);
    let text = aspace.region(0).unwrap().pbase().unwrap();

    let r = vm.fault(Some(&aspace), READ, 0x1500).unwrap();
    assert_eq!(r.segment, Segment::Text);
    assert_eq!(r.page, VirtualAddress::new(0x1000));
    assert_eq!(r.frame, text);
    let entry = vm.mmu().tlb().probe(VirtualAddress::new(0x1500)).unwrap();
    assert_eq!(entry.lo.frame(), text);
    // the byte at 0x1500 lives at pbase1 + 0x500
    assert_eq!(
        aspace.translate(VirtualAddress::new(0x1500)).unwrap().pa,
        text + 0x500
    );

    assert_eq!(
        vm.fault(Some(&aspace), READ, 0x3500),
        Err(VmError::Unmapped(VirtualAddress::new(0x3500)))
    );
    assert_eq!(vm.fault_errno(Some(&aspace), READ, 0x3500), Errno::BadAddress.as_i32());
    assert!(vm.mmu().tlb().probe(VirtualAddress::new(0x3500)).is_none());

    let top = USER_STACK_TOP.as_u32();
    let r = vm.fault(Some(&aspace), WRITE, top - 100).unwrap();
    assert_eq!(r.segment, Segment::Stack);
    let stack = aspace.stack().pbase().unwrap();
    assert!(r.frame >= stack && r.frame < stack + 12 * PAGE_SIZE);
    assert_eq!(r.frame, stack + 11 * PAGE_SIZE);

    vm.as_destroy(aspace);
}

#[test]
fn text_is_writable_only_while_loading() {
    let ram = SimRam::new(128);
    let vm = boot(&ram);
    let mut aspace = two_page_program(&vm);

    let loading = vm.fault(Some(&aspace), WRITE, 0x1004).unwrap();
    assert!(loading.dirty);
    assert!(vm.mmu().tlb().probe(VirtualAddress::new(0x1004)).unwrap().lo.dirty());

    vm.as_complete_load(&mut aspace);
    assert_eq!(vm.mmu().tlb().valid_count(), 0);

    let loaded = vm.fault(Some(&aspace), WRITE, 0x1004).unwrap();
    assert!(!loaded.dirty);
    assert!(!vm.mmu().tlb().probe(VirtualAddress::new(0x1004)).unwrap().lo.dirty());

    // data and stack stay writable
    assert!(vm.fault(Some(&aspace), WRITE, 0x2004).unwrap().dirty);
    assert!(vm.fault(Some(&aspace), WRITE, USER_STACK_TOP.as_u32() - 4).unwrap().dirty);

    vm.as_destroy(aspace);
}

#[test]
fn text_cannot_shadow_the_stack() {
    let ram = SimRam::new(128);
    let vm = boot(&ram);
    let perms = Permissions::new().with_read(true).with_write(true);
    let mut aspace = AddressSpace::new();

    let over = VirtualAddress::new(0x7FFF_0000);
    assert_eq!(
        aspace.define_region(over, 0x1_0000, perms),
        Err(VmError::InvalidRange(over))
    );
    let below = USER_STACK_BASE.checked_sub(2 * PAGE_SIZE).unwrap();
    aspace.define_region(below, 2 * PAGE_SIZE, perms).unwrap();
    vm.as_prepare_load(&mut aspace).unwrap();
    vm.as_complete_load(&mut aspace);

    let r = vm.fault(Some(&aspace), WRITE, USER_STACK_TOP.as_u32() - 100).unwrap();
    assert_eq!(r.segment, Segment::Stack);
    assert!(r.dirty);
    let r = vm.fault(Some(&aspace), WRITE, below.as_u32() + 4).unwrap();
    assert_eq!(r.segment, Segment::Text);
    assert!(!r.dirty);
    vm.as_destroy(aspace);
}

#[test]
fn store_to_clean_page_kills_the_process() {
    let ram = SimRam::new(128);
    let vm = boot(&ram);
    let aspace = two_page_program(&vm);

    let err = vm.fault(Some(&aspace), READONLY, 0x1008).unwrap_err();
    assert_eq!(err, VmError::ReadOnly(VirtualAddress::new(0x1000)));
    assert!(err.terminates_process());
    assert_eq!(err.errno(), Errno::BadAddress);
    vm.as_destroy(aspace);
}

#[test]
fn unknown_fault_type_is_an_argument_error() {
    let ram = SimRam::new(128);
    let vm = boot(&ram);
    let aspace = two_page_program(&vm);

    let err = vm.fault(Some(&aspace), 9, 0x1000).unwrap_err();
    assert_eq!(err, VmError::InvalidFaultType(9));
    assert!(!err.terminates_process());
    assert_eq!(vm.fault_errno(Some(&aspace), 9, 0x1000), 8);
    assert_eq!(vm.mmu().tlb().valid_count(), 0);
    vm.as_destroy(aspace);
}

#[test]
fn fault_without_address_space() {
    let ram = SimRam::new(64);
    let vm = boot(&ram);
    assert_eq!(vm.fault(None, READ, 0x1000), Err(VmError::NoAddressSpace));
    assert_eq!(vm.fault_errno(None, WRITE, 0x1000), Errno::BadAddress.as_i32());
}

#[test]
fn free_slots_fill_first_then_random_replacement() {
    let ram = SimRam::new(256);
    let vm = boot(&ram);
    let pages = NUM_TLB as u32 + 8;
    let mut aspace = AddressSpace::new();
    aspace
        .define_region(VirtualAddress::new(0x0040_0000), pages * PAGE_SIZE, Permissions::new())
        .unwrap();
    vm.as_prepare_load(&mut aspace).unwrap();
    vm.as_activate(Some(&aspace));

    for (slot, page) in (0..NUM_TLB as u32).enumerate() {
        let r = vm
            .fault(Some(&aspace), READ, 0x0040_0000 + page * PAGE_SIZE)
            .unwrap();
        assert_eq!(r.placement, Placement::Slot(slot));
    }
    assert_eq!(vm.mmu().tlb().valid_count(), NUM_TLB);
    assert_eq!(vm.mmu().tlb().random_writes(), 0);

    for page in NUM_TLB as u32..pages {
        let va = 0x0040_0000 + page * PAGE_SIZE;
        let r = vm.fault(Some(&aspace), READ, va).unwrap();
        assert_eq!(r.placement, Placement::Random);
        assert!(vm.mmu().tlb().probe(VirtualAddress::new(va)).is_some());
    }
    assert_eq!(vm.mmu().tlb().random_writes(), 8);
    assert_eq!(vm.mmu().tlb().valid_count(), NUM_TLB);

    vm.as_destroy(aspace);
}

#[test]
fn tlb_updates_run_with_interrupts_off() {
    let ram = SimRam::new(128);
    let vm = boot(&ram);
    let aspace = two_page_program(&vm);
    let irq = vm.mmu().interrupts();

    let before = irq.disable_count();
    vm.fault(Some(&aspace), READ, 0x1000).unwrap();
    assert_eq!(irq.disable_count(), before + 1);
    assert!(irq.enabled());

    // a fault that fails before touching the TLB leaves interrupts alone
    vm.fault(Some(&aspace), READ, 0x3500).unwrap_err();
    assert_eq!(irq.disable_count(), before + 1);

    vm.as_activate(Some(&aspace));
    assert_eq!(irq.disable_count(), before + 2);
    assert!(irq.enabled());
    vm.as_destroy(aspace);
}

#[test]
fn activation_flushes_only_for_user_processes() {
    let ram = SimRam::new(128);
    let vm = boot(&ram);
    let aspace = two_page_program(&vm);
    vm.fault(Some(&aspace), READ, 0x1000).unwrap();
    vm.fault(Some(&aspace), READ, 0x2000).unwrap();

    vm.as_activate(None);
    assert_eq!(vm.mmu().tlb().valid_count(), 2);
    aspace.deactivate();
    assert_eq!(vm.mmu().tlb().valid_count(), 2);

    vm.as_activate(Some(&aspace));
    assert_eq!(vm.mmu().tlb().valid_count(), 0);
    vm.as_destroy(aspace);
}

#[test]
#[should_panic(expected = "tlb shootdown is not supported")]
fn shootdown_is_a_kernel_bug() {
    let ram = SimRam::new(64);
    let vm = boot(&ram);
    vm.tlb_shootdown(VirtualAddress::new(0x1000));
}
