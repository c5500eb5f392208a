use kernel_info::memory::{USER_STACK_BASE, USER_STACK_PAGES, USER_STACK_TOP};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_vm::sim::{SimInterrupts, SimRam, SimTlb};
use kernel_vm::{AddressSpace, Permissions, Segment, Vm, VmError};

type SimVm<'m> = Vm<'m, SimRam, SimTlb, SimInterrupts>;

fn boot(ram: &SimRam) -> SimVm<'_> {
    let vm = unsafe {
        Vm::new(
            ram,
            PhysicalAddress::new(0x1_0000),
            ram.end(),
            SimTlb::new(0),
            SimInterrupts::new(),
        )
    };
    vm.bootstrap();
    vm
}

fn rwx() -> Permissions {
    Permissions::new()
        .with_read(true)
        .with_write(true)
        .with_execute(true)
}

/// Text at 0x0040_0000 (2 pages), data at 0x1000_0000 (3 pages).
fn program(vm: &SimVm<'_>) -> AddressSpace {
    let mut aspace = AddressSpace::new();
    aspace
        .define_region(VirtualAddress::new(0x0040_0000), 2 * PAGE_SIZE, rwx())
        .unwrap();
    aspace
        .define_region(VirtualAddress::new(0x1000_0000), 0x2800, rwx())
        .unwrap();
    vm.as_prepare_load(&mut aspace).unwrap();
    aspace
}

#[test]
fn define_region_aligns_base_and_covers_the_range() {
    let cases = [
        (0x0000_0000, 1),
        (0x0040_0000, 0x1000),
        (0x0040_0001, 0x1000),
        (0x0040_0FFF, 2),
        (0x1000_0123, 0x1_0000),
        (0x7FF0_0000, 0xFFFF),
    ];
    for (vaddr, size) in cases {
        let mut aspace = AddressSpace::new();
        aspace
            .define_region(VirtualAddress::new(vaddr), size, Permissions::new())
            .unwrap();
        let r = aspace.region(0).unwrap();
        let base = u64::from(r.vbase().as_u32());
        let end = base + r.npages() as u64 * u64::from(PAGE_SIZE);
        assert!(r.vbase().is_page_aligned(), "{vaddr:#x}");
        assert!(base <= u64::from(vaddr));
        assert!(end >= u64::from(vaddr) + u64::from(size), "{vaddr:#x}+{size:#x}");
        // and not a page more than needed
        assert!(end - u64::from(PAGE_SIZE) < u64::from(vaddr) + u64::from(size));
    }
}

#[test]
fn at_most_two_program_regions() {
    let mut aspace = AddressSpace::new();
    let perms = Permissions::new().with_read(true);
    aspace.define_region(VirtualAddress::new(0x1000), 10, perms).unwrap();
    aspace.define_region(VirtualAddress::new(0x5000), 10, perms).unwrap();
    let err = aspace
        .define_region(VirtualAddress::new(0x9000), 10, perms)
        .unwrap_err();
    assert_eq!(err, VmError::TooManyRegions);
    assert!(!err.terminates_process());
    assert!(aspace.region(2).is_none());
}

#[test]
fn prepare_load_binds_zeroed_frames() {
    let ram = SimRam::new(256);
    let vm = boot(&ram);

    // leave garbage behind in frames the address space will reuse
    let junk = vm.memory().alloc_frames(32).unwrap();
    unsafe { vm.memory().write_bytes(junk, &[0xAA; 32 * PAGE_SIZE as usize]) };
    vm.memory().free_frames(junk);

    let aspace = program(&vm);
    assert_eq!(vm.stats().used, 2 + 3 + USER_STACK_PAGES);

    let text = aspace.region(0).unwrap();
    let data = aspace.region(1).unwrap();
    let stack = aspace.stack();
    for region in [text, data, stack] {
        assert!(region.pbase().is_some());
        let mut bytes = vec![0xFF; region.npages() * PAGE_SIZE as usize];
        aspace.copy_in(vm.memory(), region.vbase(), &mut bytes).unwrap();
        assert!(bytes.iter().all(|&b| b == 0));
    }
    assert_eq!(aspace.define_stack(), USER_STACK_TOP);
    vm.as_destroy(aspace);
    assert_eq!(vm.stats().used, 0);
}

#[test]
#[should_panic(expected = "already holds frames")]
fn prepare_load_twice_is_fatal() {
    let ram = SimRam::new(256);
    let vm = boot(&ram);
    let mut aspace = program(&vm);
    let _ = vm.as_prepare_load(&mut aspace);
}

#[test]
fn prepare_load_failure_keeps_partial_frames_for_destroy() {
    let ram = SimRam::new(64);
    let vm = boot(&ram);
    let total = vm.stats().total;

    let mut aspace = AddressSpace::new();
    aspace
        .define_region(VirtualAddress::new(0x0040_0000), 8 * PAGE_SIZE, rwx())
        .unwrap();
    aspace
        .define_region(VirtualAddress::new(0x1000_0000), (total as u32) * PAGE_SIZE, rwx())
        .unwrap();

    assert_eq!(vm.as_prepare_load(&mut aspace), Err(VmError::OutOfMemory));
    assert!(aspace.region(0).unwrap().pbase().is_some());
    assert!(aspace.region(1).unwrap().pbase().is_none());
    assert_eq!(vm.stats().used, 8);

    vm.as_destroy(aspace);
    assert_eq!(vm.stats().used, 0);
}

#[test]
fn empty_address_space_still_gets_a_stack() {
    let ram = SimRam::new(64);
    let vm = boot(&ram);
    let mut aspace = AddressSpace::new();
    vm.as_prepare_load(&mut aspace).unwrap();
    assert_eq!(vm.stats().used, USER_STACK_PAGES);
    assert_eq!(aspace.define_stack(), USER_STACK_TOP);
    vm.as_destroy(aspace);
}

#[test]
fn copy_gives_identical_layout_on_disjoint_frames() {
    let ram = SimRam::new(256);
    let vm = boot(&ram);
    let mut parent = program(&vm);
    vm.as_complete_load(&mut parent);

    let text = VirtualAddress::new(0x0040_0010);
    let data = VirtualAddress::new(0x1000_2000);
    let sp = USER_STACK_TOP.checked_sub(16).unwrap();
    parent.copy_out(vm.memory(), text, b"text").unwrap();
    parent.copy_out(vm.memory(), data, b"data").unwrap();
    parent.copy_out(vm.memory(), sp, b"stack").unwrap();

    let child = vm.as_copy(&parent).unwrap();
    assert!(parent.is_loaded());
    assert!(!child.is_loaded());
    for i in 0..2 {
        let (p, c) = (parent.region(i).unwrap(), child.region(i).unwrap());
        assert_eq!((p.vbase(), p.npages()), (c.vbase(), c.npages()));
        assert_ne!(p.pbase(), c.pbase());
    }
    assert_ne!(parent.stack().pbase(), child.stack().pbase());

    let mut buf = [0u8; 5];
    child.copy_in(vm.memory(), sp, &mut buf).unwrap();
    assert_eq!(&buf, b"stack");
    child.copy_in(vm.memory(), data, &mut buf[..4]).unwrap();
    assert_eq!(&buf[..4], b"data");

    // writes after the copy stay private
    parent.copy_out(vm.memory(), text, b"TEXT").unwrap();
    child.copy_in(vm.memory(), text, &mut buf[..4]).unwrap();
    assert_eq!(&buf[..4], b"text");

    vm.as_destroy(child);
    vm.as_destroy(parent);
    assert_eq!(vm.memory().audit().unwrap().used, 0);
}

#[test]
fn copy_starts_a_fresh_load_phase() {
    let ram = SimRam::new(256);
    let vm = boot(&ram);
    let mut parent = program(&vm);
    vm.as_complete_load(&mut parent);
    let text = 0x0040_1004;

    assert!(!vm.fault(Some(&parent), 1, text).unwrap().dirty);
    let mut child = vm.as_copy(&parent).unwrap();
    vm.as_activate(Some(&child));
    assert!(vm.fault(Some(&child), 1, text).unwrap().dirty);

    vm.as_complete_load(&mut child);
    assert!(!vm.fault(Some(&child), 1, text).unwrap().dirty);

    vm.as_destroy(child);
    vm.as_destroy(parent);
}

#[test]
fn failed_copy_releases_the_partial_child() {
    let ram = SimRam::new(64);
    let vm = boot(&ram);
    let parent = program(&vm);

    // leave less than a full copy's worth of frames
    let free = vm.stats().free;
    let hog = vm.memory().alloc_frames(free - 4).unwrap();
    let before = vm.stats();

    assert_eq!(vm.as_copy(&parent).unwrap_err(), VmError::OutOfMemory);
    assert_eq!(vm.stats(), before);

    vm.memory().free_frames(hog);
    vm.as_destroy(parent);
}

#[test]
fn user_copies_must_stay_inside_one_region() {
    let ram = SimRam::new(256);
    let vm = boot(&ram);
    let aspace = program(&vm);

    let text_end = VirtualAddress::new(0x0040_2000);
    assert_eq!(
        aspace.copy_out(vm.memory(), text_end.checked_sub(2).unwrap(), b"abcd"),
        Err(VmError::InvalidRange(VirtualAddress::new(0x0040_1FFE)))
    );
    assert_eq!(
        aspace.copy_out(vm.memory(), text_end, b"x"),
        Err(VmError::Unmapped(text_end))
    );
    let mut buf = [0u8; 8];
    assert_eq!(
        aspace.copy_in(vm.memory(), USER_STACK_TOP.checked_sub(4).unwrap(), &mut buf),
        Err(VmError::InvalidRange(VirtualAddress::new(0x7FFF_FFFC)))
    );
    assert_eq!(aspace.copy_out(vm.memory(), text_end, b""), Ok(()));
    vm.as_destroy(aspace);
}

#[test]
fn translate_classifies_every_segment() {
    let ram = SimRam::new(256);
    let vm = boot(&ram);
    let aspace = program(&vm);

    let text = aspace.translate(VirtualAddress::new(0x0040_1234)).unwrap();
    assert_eq!(text.segment, Segment::Text);
    assert_eq!(text.pa, aspace.region(0).unwrap().pbase().unwrap() + 0x1234);

    let data = aspace.translate(VirtualAddress::new(0x1000_2FFF)).unwrap();
    assert_eq!(data.segment, Segment::Data);

    let stack = aspace.translate(USER_STACK_BASE).unwrap();
    assert_eq!(stack.segment, Segment::Stack);
    assert_eq!(Some(stack.pa), aspace.stack().pbase());

    assert_eq!(aspace.translate(VirtualAddress::new(0x1000_3000)), None);
    assert_eq!(aspace.translate(USER_STACK_BASE.checked_sub(1).unwrap()), None);
    assert_eq!(aspace.translate(USER_STACK_TOP), None);
    vm.as_destroy(aspace);
}
