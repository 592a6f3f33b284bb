use hvx_core::{Bitness, HvxError, ProcessId, StealthyReader, Va};
use hvx_driver_memory::MemoryDriver;

use super::*;
use crate::{
    fixture::{LoaderAddresses, LoaderFixture, PID},
    WindowsError,
    loader::{LoaderLayout, Native64Layout, WalkStop, Wow64Layout},
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

fn system_modules(bitness: Bitness) -> LoaderFixture {
    LoaderFixture::new(PID, bitness)
        .module(
            "notepad.exe",
            r"C:\Windows\System32\notepad.exe",
            Va(0x7ff6_0000),
            0x38000,
        )
        .module(
            "ntdll.dll",
            r"C:\Windows\System32\ntdll.dll",
            Va(0x7ffb_0000),
            0x1f8000,
        )
        .module(
            "KERNEL32.DLL",
            r"C:\Windows\System32\KERNEL32.DLL",
            Va(0x7ffa_0000),
            0xc4000,
        )
}

fn five_modules(bitness: Bitness) -> LoaderFixture {
    system_modules(bitness)
        .module("USER32.dll", r"C:\Windows\System32\USER32.dll", Va(0x7ff9_0000), 0x1a000)
        .module("GDI32.dll", r"C:\Windows\System32\GDI32.dll", Va(0x7ff8_0000), 0x29000)
}

/// Rewrites the links of every entry so that the list cycles through the
/// entries forever without passing the list head.
fn make_cyclic(
    driver: &mut MemoryDriver,
    addresses: &LoaderAddresses,
    bitness: Bitness,
) -> Result<(), HvxError> {
    let entries = &addresses.entries;
    for (index, entry) in entries.iter().enumerate() {
        let next = entries[(index + 1) % entries.len()];
        match bitness {
            Bitness::Native64 => driver.write_u64(PID, *entry, next.0)?,
            Bitness::Wow64On64 => driver.write_u32(PID, *entry, next.0 as u32)?,
        }
    }

    Ok(())
}

#[test]
fn enumerates_native64_modules_in_load_order() -> Result<(), HvxError> {
    init_tracing();

    let mut driver = MemoryDriver::new();
    system_modules(Bitness::Native64).install(&mut driver)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.enumerate_modules(PID, 16)?;

    assert_eq!(result.total_seen, 3);
    assert!(!result.is_truncated());
    assert_eq!(
        result.records[1],
        ModuleRecord {
            base_address: Va(0x7ffb_0000),
            size: 0x1f8000,
            name: String::from("ntdll.dll"),
            path: String::from(r"C:\Windows\System32\ntdll.dll"),
        }
    );

    let names = result
        .records
        .iter()
        .map(|record| record.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, ["notepad.exe", "ntdll.dll", "KERNEL32.DLL"]);

    Ok(())
}

#[test]
fn enumerates_wow64_modules_through_32bit_layout() -> Result<(), HvxError> {
    init_tracing();

    let mut driver = MemoryDriver::new();
    system_modules(Bitness::Wow64On64).install(&mut driver)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.enumerate_modules(PID, 16)?;

    assert_eq!(result.total_seen, 3);
    assert_eq!(result.records[2].name, "KERNEL32.DLL");
    assert_eq!(result.records[2].path, r"C:\Windows\System32\KERNEL32.DLL");
    assert_eq!(result.records[2].base_address, Va(0x7ffa_0000));
    assert_eq!(result.records[2].size, 0xc4000);

    Ok(())
}

#[test]
fn capacity_truncates_records_but_not_total() -> Result<(), HvxError> {
    for bitness in [Bitness::Native64, Bitness::Wow64On64] {
        let mut driver = MemoryDriver::new();
        five_modules(bitness).install(&mut driver)?;

        let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
        let result = enumerator.enumerate_modules(PID, 2)?;

        assert_eq!(result.records.len(), 2, "{bitness:?}");
        assert_eq!(result.total_seen, 5, "{bitness:?}");
        assert!(result.is_truncated());
    }

    Ok(())
}

#[test]
fn zero_capacity_still_counts_modules() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    five_modules(Bitness::Native64).install(&mut driver)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.enumerate_modules(PID, 0)?;

    assert!(result.records.is_empty());
    assert_eq!(result.total_seen, 5);

    Ok(())
}

#[test]
fn empty_list_yields_no_modules() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    LoaderFixture::new(PID, Bitness::Native64).install(&mut driver)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.enumerate_modules(PID, 16)?;

    assert_eq!(result, ModuleEnumeration::default());

    Ok(())
}

#[test]
fn cyclic_native64_list_stops_at_ceiling() -> Result<(), HvxError> {
    init_tracing();

    let mut driver = MemoryDriver::new();
    let addresses = five_modules(Bitness::Native64).install(&mut driver)?;
    make_cyclic(&mut driver, &addresses, Bitness::Native64)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.enumerate_modules(PID, 8)?;

    assert_eq!(result.total_seen, Native64Layout::ITERATION_CEILING);
    assert_eq!(result.total_seen, 4096);
    assert_eq!(result.records.len(), 8);

    Ok(())
}

#[test]
fn cyclic_wow64_list_stops_at_ceiling() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    let addresses = five_modules(Bitness::Wow64On64).install(&mut driver)?;
    make_cyclic(&mut driver, &addresses, Bitness::Wow64On64)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.enumerate_modules(PID, 8)?;

    assert_eq!(result.total_seen, Wow64Layout::ITERATION_CEILING);
    assert_eq!(result.total_seen, 2048);

    Ok(())
}

#[test]
fn walk_reports_stop_reasons() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    let addresses = system_modules(Bitness::Native64).install(&mut driver)?;

    let reader = StealthyReader::new(&driver);
    let mut walk = LoaderWalk::<_, Native64Layout>::new(reader, PID, addresses.peb)?;
    assert_eq!(walk.cursor().current, addresses.entries[0]);
    assert_eq!(walk.cursor().list_head, addresses.list_head);
    assert_eq!(walk.by_ref().count(), 3);
    assert_eq!(walk.stop_reason(), Some(WalkStop::ListHead));
    assert_eq!(walk.next().map(|entry| entry.dll_base), None);

    // Sever the list after the second module.
    driver.write_u64(PID, addresses.entries[1], 0)?;
    let reader = StealthyReader::new(&driver);
    let mut walk = LoaderWalk::<_, Native64Layout>::new(reader, PID, addresses.peb)?;
    assert_eq!(walk.by_ref().count(), 2);
    assert_eq!(walk.stop_reason(), Some(WalkStop::NullLink));

    Ok(())
}

#[test]
fn unreadable_entry_ends_enumeration_successfully() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    let addresses = system_modules(Bitness::Native64).install(&mut driver)?;

    // Point the second module at an unmapped node.
    driver.write_u64(PID, addresses.entries[1], 0x7000_0000)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.enumerate_modules(PID, 16)?;

    assert_eq!(result.total_seen, 2);
    assert_eq!(result.records[1].name, "ntdll.dll");

    Ok(())
}

#[test]
fn wow64_layout_rejects_links_above_4gib() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    system_modules(Bitness::Wow64On64).install(&mut driver)?;
    driver.clear_physical_reads();

    let reader = StealthyReader::new(&driver);
    let result = Wow64Layout::read_entry(&reader, PID, Va(0x1_0050_0fc0));

    match result {
        Err(HvxError::Os(err)) => assert!(matches!(
            err.downcast_ref::<WindowsError>(),
            Some(WindowsError::CorruptedStruct(_))
        )),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    assert!(driver.physical_reads().is_empty());

    Ok(())
}

#[test]
fn find_module_base_ignores_case() -> Result<(), HvxError> {
    for bitness in [Bitness::Native64, Bitness::Wow64On64] {
        let mut driver = MemoryDriver::new();
        system_modules(bitness).install(&mut driver)?;

        let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
        assert_eq!(
            enumerator.find_module_base(PID, "kernel32.dll")?,
            Va(0x7ffa_0000)
        );
        assert_eq!(enumerator.find_module_base(PID, "NTDLL.DLL")?, Va(0x7ffb_0000));
    }

    Ok(())
}

#[test]
fn find_module_returns_full_record() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    system_modules(Bitness::Native64).install(&mut driver)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let record = enumerator.find_module(PID, "ntdll.dll")?;

    assert_eq!(record.size, 0x1f8000);
    assert_eq!(record.path, r"C:\Windows\System32\ntdll.dll");

    Ok(())
}

#[test]
fn find_module_base_without_match_is_not_found() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    system_modules(Bitness::Native64).install(&mut driver)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.find_module_base(PID, "win32u.dll");

    assert!(matches!(result, Err(HvxError::NotFound)));

    Ok(())
}

#[test]
fn find_module_rejects_empty_name() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    system_modules(Bitness::Native64).install(&mut driver)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.find_module_base(PID, "");

    assert!(matches!(result, Err(HvxError::InvalidParameter)));
    assert!(driver.physical_reads().is_empty());

    Ok(())
}

#[test]
fn zero_length_name_is_empty_string() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    let addresses = system_modules(Bitness::Native64).install(&mut driver)?;

    // Zero the length of BaseDllName of the first module.
    let length = addresses.entries[0]
        + std::mem::offset_of!(crate::comps::LdrDataTableEntry64, base_dll_name) as u64;
    driver.write_u16(PID, length, 0)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.enumerate_modules(PID, 16)?;

    assert_eq!(result.total_seen, 3);
    assert_eq!(result.records[0].name, "");
    assert_eq!(result.records[0].path, r"C:\Windows\System32\notepad.exe");

    Ok(())
}

#[test]
fn string_capacity_truncates_names() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    system_modules(Bitness::Native64).install(&mut driver)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver)).with_string_capacity(6);
    let result = enumerator.enumerate_modules(PID, 16)?;

    // Five characters plus the terminator.
    assert_eq!(result.records[1].name, "ntdll");
    assert_eq!(result.records[1].path, r"C:\Wi");

    Ok(())
}

#[test]
fn unknown_process_is_invalid_parameter() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    system_modules(Bitness::Native64).install(&mut driver)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.enumerate_modules(ProcessId(1), 16);

    assert!(matches!(result, Err(HvxError::InvalidParameter)));
    assert!(driver.physical_reads().is_empty());

    Ok(())
}

#[test]
fn unreadable_environment_block_is_unsuccessful() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    let addresses = system_modules(Bitness::Native64).install(&mut driver)?;
    driver.unmap(PID, addresses.peb)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.enumerate_modules(PID, 16);

    assert!(matches!(result, Err(HvxError::Unsuccessful)));

    Ok(())
}

#[test]
fn missing_loader_data_is_unsuccessful() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    let addresses = system_modules(Bitness::Wow64On64).install(&mut driver)?;

    // Clear Peb32.Ldr.
    let ldr = addresses.peb + std::mem::offset_of!(crate::comps::Peb32, ldr) as u64;
    driver.write_u32(PID, ldr, 0)?;

    let enumerator = ModuleEnumerator::new(StealthyReader::new(&driver));
    let result = enumerator.find_module_base(PID, "ntdll.dll");

    assert!(matches!(result, Err(HvxError::Unsuccessful)));

    Ok(())
}

#[test]
fn entry_reads_are_page_chunked() -> Result<(), HvxError> {
    let mut driver = MemoryDriver::new();
    let addresses = system_modules(Bitness::Native64).install(&mut driver)?;

    let reader = StealthyReader::new(&driver);
    let walk = LoaderWalk::<_, Native64Layout>::new(reader, PID, addresses.peb)?;
    driver.clear_physical_reads();
    let _ = walk.take(1).count();

    // The first entry starts 0x40 bytes before a page boundary.
    let lengths = driver
        .physical_reads()
        .iter()
        .map(|access| access.len)
        .collect::<Vec<_>>();
    assert_eq!(lengths, [0x40, 0x68 - 0x40]);

    Ok(())
}
