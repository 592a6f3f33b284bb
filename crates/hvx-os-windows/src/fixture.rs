//! Synthetic guest scenarios for tests.
//!
//! Builds loader structures and PE images inside a [`MemoryDriver`] so that
//! the enumerator and its consumers can be exercised without a live guest.
//! All addresses stay below 4 GiB so the same layout serves both bitness
//! families.

use hvx_core::{Bitness, ProcessId, Va};
use hvx_driver_memory::{MemoryDriver, MemoryDriverError};
use zerocopy::IntoBytes;

use crate::comps::{
    LdrDataTableEntry32, LdrDataTableEntry64, ListEntry32, ListEntry64, Peb32, Peb64,
    PebLdrData32, PebLdrData64, UnicodeString32, UnicodeString64,
};

/// Process identifier used by the scenarios.
pub const PID: ProcessId = ProcessId(4242);

/// Native environment block.
pub const PEB: Va = Va(0x30_0000);

/// 32-bit environment block of WoW64 scenarios.
pub const PEB32: Va = Va(0x30_1000);

/// Loader data.
pub const LDR: Va = Va(0x40_0000);

/// First module entry. Straddles a page boundary on purpose.
pub const ENTRIES: Va = Va(0x50_0fc0);

/// Spacing of module entries.
pub const ENTRY_STRIDE: u64 = 0x80;

/// Start of the string pool.
pub const STRINGS: Va = Va(0x60_0000);

struct FixtureModule {
    name: String,
    path: String,
    base: Va,
    size: u32,
}

/// Addresses of the installed loader structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderAddresses {
    /// Environment block matching the bitness of the scenario.
    pub peb: Va,

    /// Loader data.
    pub ldr: Va,

    /// In-load-order list head.
    pub list_head: Va,

    /// Module entries, in list order.
    pub entries: Vec<Va>,
}

/// Builder of a loader list scenario.
pub struct LoaderFixture {
    pid: ProcessId,
    bitness: Bitness,
    modules: Vec<FixtureModule>,
}

impl LoaderFixture {
    /// Creates an empty scenario.
    pub fn new(pid: ProcessId, bitness: Bitness) -> Self {
        Self {
            pid,
            bitness,
            modules: Vec::new(),
        }
    }

    /// Appends a module to the in-load-order list.
    pub fn module(mut self, name: &str, path: &str, base: Va, size: u32) -> Self {
        self.modules.push(FixtureModule {
            name: name.into(),
            path: path.into(),
            base,
            size,
        });
        self
    }

    /// Creates the process in `driver` and writes the scenario into it.
    pub fn install(&self, driver: &mut MemoryDriver) -> Result<LoaderAddresses, MemoryDriverError> {
        driver.create_process(self.pid);
        driver.set_peb(self.pid, PEB)?;

        match self.bitness {
            Bitness::Native64 => self.install_native64(driver),
            Bitness::Wow64On64 => {
                driver.set_wow64_peb(self.pid, PEB32)?;
                self.install_wow64(driver)
            }
        }
    }

    fn install_native64(&self, driver: &mut MemoryDriver) -> Result<LoaderAddresses, MemoryDriverError> {
        let list_head = LDR + std::mem::offset_of!(PebLdrData64, in_load_order_module_list) as u64;
        let entries = self.entry_addresses();
        let (first, last) = Self::ends(&entries, list_head);

        let peb = Peb64 {
            ldr: LDR.0,
            ..Default::default()
        };
        driver.write(self.pid, PEB, peb.as_bytes())?;

        let ldr = PebLdrData64 {
            length: size_of::<PebLdrData64>() as u32,
            initialized: 1,
            in_load_order_module_list: ListEntry64 {
                flink: first.0,
                blink: last.0,
            },
            ..Default::default()
        };
        driver.write(self.pid, LDR, ldr.as_bytes())?;

        let mut strings = StringPool::new(STRINGS);
        for (index, module) in self.modules.iter().enumerate() {
            let (next, prev) = Self::neighbours(&entries, index, list_head);
            let (name, name_length) = strings.push(driver, self.pid, &module.name)?;
            let (path, path_length) = strings.push(driver, self.pid, &module.path)?;

            let entry = LdrDataTableEntry64 {
                in_load_order_links: ListEntry64 {
                    flink: next.0,
                    blink: prev.0,
                },
                dll_base: module.base.0,
                size_of_image: module.size,
                full_dll_name: UnicodeString64::new(path, path_length),
                base_dll_name: UnicodeString64::new(name, name_length),
                ..Default::default()
            };
            driver.write(self.pid, entries[index], entry.as_bytes())?;
        }

        Ok(LoaderAddresses {
            peb: PEB,
            ldr: LDR,
            list_head,
            entries,
        })
    }

    fn install_wow64(&self, driver: &mut MemoryDriver) -> Result<LoaderAddresses, MemoryDriverError> {
        let list_head = LDR + std::mem::offset_of!(PebLdrData32, in_load_order_module_list) as u64;
        let entries = self.entry_addresses();
        let (first, last) = Self::ends(&entries, list_head);

        let peb = Peb32 {
            ldr: LDR.0 as u32,
            ..Default::default()
        };
        driver.write(self.pid, PEB32, peb.as_bytes())?;

        let ldr = PebLdrData32 {
            length: size_of::<PebLdrData32>() as u32,
            initialized: 1,
            in_load_order_module_list: ListEntry32 {
                flink: first.0 as u32,
                blink: last.0 as u32,
            },
            ..Default::default()
        };
        driver.write(self.pid, LDR, ldr.as_bytes())?;

        let mut strings = StringPool::new(STRINGS);
        for (index, module) in self.modules.iter().enumerate() {
            let (next, prev) = Self::neighbours(&entries, index, list_head);
            let (name, name_length) = strings.push(driver, self.pid, &module.name)?;
            let (path, path_length) = strings.push(driver, self.pid, &module.path)?;

            let entry = LdrDataTableEntry32 {
                in_load_order_links: ListEntry32 {
                    flink: next.0 as u32,
                    blink: prev.0 as u32,
                },
                dll_base: module.base.0 as u32,
                size_of_image: module.size,
                full_dll_name: UnicodeString32::new(path, path_length),
                base_dll_name: UnicodeString32::new(name, name_length),
                ..Default::default()
            };
            driver.write(self.pid, entries[index], entry.as_bytes())?;
        }

        Ok(LoaderAddresses {
            peb: PEB32,
            ldr: LDR,
            list_head,
            entries,
        })
    }

    fn entry_addresses(&self) -> Vec<Va> {
        (0..self.modules.len() as u64)
            .map(|index| ENTRIES + index * ENTRY_STRIDE)
            .collect()
    }

    fn ends(entries: &[Va], list_head: Va) -> (Va, Va) {
        (
            entries.first().copied().unwrap_or(list_head),
            entries.last().copied().unwrap_or(list_head),
        )
    }

    fn neighbours(entries: &[Va], index: usize, list_head: Va) -> (Va, Va) {
        let next = entries.get(index + 1).copied().unwrap_or(list_head);
        let prev = match index {
            0 => list_head,
            _ => entries[index - 1],
        };
        (next, prev)
    }
}

/// Sequential allocator of NUL-terminated UTF-16 strings.
struct StringPool {
    next: Va,
}

impl StringPool {
    fn new(start: Va) -> Self {
        Self { next: start }
    }

    /// Writes `value` and returns its address and its length in bytes.
    fn push(
        &mut self,
        driver: &mut MemoryDriver,
        pid: ProcessId,
        value: &str,
    ) -> Result<(Va, u16), MemoryDriverError> {
        let mut bytes = value
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect::<Vec<_>>();
        let length = bytes.len() as u16;
        bytes.extend_from_slice(&[0, 0]);

        let va = self.next;
        driver.write(pid, va, &bytes)?;
        self.next = va + ((bytes.len() as u64 + 0xf) & !0xf);

        Ok((va, length))
    }
}

/// Builds a minimal PE32+ image exporting `exports`, given as name and
/// function RVA pairs. RVAs must lie outside the export directory, which
/// starts at RVA `0x1000`.
pub fn pe64_image(exports: &[(&str, u32)]) -> Vec<u8> {
    const NT_HEADERS: usize = 0x80;
    const OPTIONAL_HEADER: usize = NT_HEADERS + 4 + 20;
    const EXPORT_DIRECTORY: usize = 0x1000;
    const DLL_NAME: &[u8] = b"ntdll.dll\0";

    let count = exports.len();
    let functions = EXPORT_DIRECTORY + 40;
    let names = functions + count * 4;
    let ordinals = names + count * 4;
    let dll_name = ordinals + count * 2;
    let mut strings = dll_name + DLL_NAME.len();

    let mut image = vec![0u8; 0x2000];

    // DOS header.
    image[0..2].copy_from_slice(b"MZ");
    put_u32(&mut image, 0x3c, NT_HEADERS as u32);

    // NT headers.
    image[NT_HEADERS..NT_HEADERS + 4].copy_from_slice(b"PE\0\0");
    put_u16(&mut image, NT_HEADERS + 4, 0x8664); // Machine
    put_u16(&mut image, NT_HEADERS + 4 + 16, 240); // SizeOfOptionalHeader
    put_u16(&mut image, NT_HEADERS + 4 + 18, 0x2022); // Characteristics
    put_u16(&mut image, OPTIONAL_HEADER, 0x20b); // Magic
    put_u32(&mut image, OPTIONAL_HEADER + 56, 0x10000); // SizeOfImage
    put_u32(&mut image, OPTIONAL_HEADER + 60, 0x400); // SizeOfHeaders
    put_u32(&mut image, OPTIONAL_HEADER + 108, 16); // NumberOfRvaAndSizes

    // Export directory.
    put_u32(&mut image, EXPORT_DIRECTORY + 12, dll_name as u32);
    put_u32(&mut image, EXPORT_DIRECTORY + 16, 1); // Base
    put_u32(&mut image, EXPORT_DIRECTORY + 20, count as u32);
    put_u32(&mut image, EXPORT_DIRECTORY + 24, count as u32);
    put_u32(&mut image, EXPORT_DIRECTORY + 28, functions as u32);
    put_u32(&mut image, EXPORT_DIRECTORY + 32, names as u32);
    put_u32(&mut image, EXPORT_DIRECTORY + 36, ordinals as u32);
    image[dll_name..dll_name + DLL_NAME.len()].copy_from_slice(DLL_NAME);

    for (index, (name, rva)) in exports.iter().enumerate() {
        put_u32(&mut image, functions + index * 4, *rva);
        put_u32(&mut image, names + index * 4, strings as u32);
        put_u16(&mut image, ordinals + index * 2, index as u16);

        image[strings..strings + name.len()].copy_from_slice(name.as_bytes());
        strings += name.len() + 1;
    }

    // Data directory entry 0 (export).
    put_u32(&mut image, OPTIONAL_HEADER + 112, EXPORT_DIRECTORY as u32);
    put_u32(&mut image, OPTIONAL_HEADER + 116, (strings - EXPORT_DIRECTORY) as u32);

    image
}

fn put_u16(image: &mut [u8], offset: usize, value: u16) {
    image[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
