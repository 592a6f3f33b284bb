//! Export table of a module mapped in a target process.

use hvx_core::{Bitness, HvxDriver, HvxError, PAGE_SIZE, ProcessId, StealthyReader, Va};
use indexmap::IndexMap;
use object::{
    endian::LittleEndian as LE,
    pe::{
        IMAGE_DIRECTORY_ENTRY_EXPORT, ImageDataDirectory, ImageDosHeader, ImageNtHeaders32,
        ImageNtHeaders64,
    },
    read::pe::{ExportTable, ExportTarget, ImageNtHeaders as _},
};

use crate::WindowsError;

/// A PE image mapped in the address space of a target process.
pub struct RemoteImage<'a, Driver>
where
    Driver: HvxDriver,
{
    reader: StealthyReader<'a, Driver>,
    pid: ProcessId,
    va: Va,
    bitness: Bitness,
}

impl<'a, Driver> RemoteImage<'a, Driver>
where
    Driver: HvxDriver,
{
    const MAX_DATA_DIRECTORY_SIZE: u32 = 1024 * 1024; // 1MB

    /// Creates a new image at `va`. `bitness` selects between the PE32 and
    /// PE32+ header layouts.
    pub fn new(reader: StealthyReader<'a, Driver>, pid: ProcessId, va: Va, bitness: Bitness) -> Self {
        Self {
            reader,
            pid,
            va,
            bitness,
        }
    }

    /// Returns the base address of the image.
    pub fn base_address(&self) -> Va {
        self.va
    }

    /// Returns the exported symbols in export-table order, mapped to their
    /// addresses. Forwarded and unnamed exports are skipped.
    pub fn exports(&self) -> Result<IndexMap<String, Va>, HvxError> {
        let entry = self.export_directory()?;
        let virtual_address = entry.virtual_address.get(LE);

        let mut data = vec![0; entry.size.get(LE) as usize];
        let va = self.va.wrapping_add(u64::from(virtual_address));
        self.reader.read_process_memory(self.pid, va, &mut data)?;

        let export_table = ExportTable::parse(&data, virtual_address)
            .map_err(|_| WindowsError::InvalidExportTable)?;

        let exports = export_table
            .exports()
            .map_err(|_| WindowsError::InvalidExportTable)?;

        Ok(exports
            .into_iter()
            .filter_map(|export| match export.target {
                ExportTarget::Address(address) => Some((
                    String::from_utf8_lossy(export.name?).into_owned(),
                    self.va.wrapping_add(u64::from(address)),
                )),
                _ => None,
            })
            .collect())
    }

    fn export_directory(&self) -> Result<ImageDataDirectory, HvxError> {
        let mut headers = vec![0; PAGE_SIZE as usize];
        self.reader
            .read_process_memory(self.pid, self.va, &mut headers)?;

        let data = headers.as_slice();
        let dos_header = ImageDosHeader::parse(data).map_err(|_| WindowsError::InvalidDosHeader)?;
        let mut offset = u64::from(dos_header.nt_headers_offset());

        let data_directories = match self.bitness {
            Bitness::Native64 => ImageNtHeaders64::parse(data, &mut offset).map(|(_, dirs)| dirs),
            Bitness::Wow64On64 => ImageNtHeaders32::parse(data, &mut offset).map(|(_, dirs)| dirs),
        }
        .map_err(|_| WindowsError::InvalidNtHeaders)?;

        let entry = data_directories
            .get(IMAGE_DIRECTORY_ENTRY_EXPORT)
            .copied()
            .ok_or(WindowsError::MissingExportDirectory)?;

        if entry.virtual_address.get(LE) == 0
            || entry.size.get(LE) == 0
            || entry.size.get(LE) > Self::MAX_DATA_DIRECTORY_SIZE
        {
            return Err(WindowsError::MissingExportDirectory.into());
        }

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use hvx_driver_memory::MemoryDriver;

    use super::*;
    use crate::fixture::{self, PID};

    const NTDLL_BASE: Va = Va(0x7ffb_0000);

    #[test]
    fn exports_are_read_in_table_order() -> Result<(), HvxError> {
        let mut driver = MemoryDriver::new();
        driver.create_process(PID);
        let image = fixture::pe64_image(&[("NtClose", 0x2010), ("ZwOpenFile", 0x2040)]);
        driver.write(PID, NTDLL_BASE, &image)?;

        let reader = StealthyReader::new(&driver);
        let exports = RemoteImage::new(reader, PID, NTDLL_BASE, Bitness::Native64).exports()?;

        assert_eq!(
            exports.into_iter().collect::<Vec<_>>(),
            vec![
                (String::from("NtClose"), NTDLL_BASE + 0x2010),
                (String::from("ZwOpenFile"), NTDLL_BASE + 0x2040),
            ]
        );

        Ok(())
    }

    #[test]
    fn garbage_headers_are_rejected() -> Result<(), HvxError> {
        let mut driver = MemoryDriver::new();
        driver.create_process(PID);
        driver.write(PID, NTDLL_BASE, &[0xcc; 0x1000])?;

        let reader = StealthyReader::new(&driver);
        let result = RemoteImage::new(reader, PID, NTDLL_BASE, Bitness::Native64).exports();

        assert!(matches!(result, Err(HvxError::Os(_))));
        Ok(())
    }

    #[test]
    fn unmapped_image_is_invalid_address() {
        let mut driver = MemoryDriver::new();
        driver.create_process(PID);

        let reader = StealthyReader::new(&driver);
        let result = RemoteImage::new(reader, PID, NTDLL_BASE, Bitness::Native64).exports();

        assert!(matches!(result, Err(HvxError::InvalidAddress(NTDLL_BASE))));
    }
}
