use std::mem::offset_of;

use hvx_core::{Bitness, HvxDriver, HvxError, ProcessId, StealthyReader, Va};

use super::{LoaderEntry, LoaderLayout, LoaderListHead, required};
use crate::comps::{LdrDataTableEntry64, ListEntry64, Peb64, PebLdrData64, RemoteUnicodeString};

/// Loader layout of native 64-bit processes.
pub struct Native64Layout;

impl LoaderLayout for Native64Layout {
    const BITNESS: Bitness = Bitness::Native64;
    const ITERATION_CEILING: usize = 4096;

    type Entry = LdrDataTableEntry64;

    fn list_head<Driver>(
        reader: &StealthyReader<Driver>,
        pid: ProcessId,
        peb: Va,
    ) -> Result<LoaderListHead, HvxError>
    where
        Driver: HvxDriver,
    {
        let peb = required("PEB", peb, reader.read_struct::<Peb64>(pid, peb))?;

        let ldr = Va(peb.ldr);
        if ldr.is_null() {
            tracing::debug!(%pid, "PEB has no loader data");
            return Err(HvxError::Unsuccessful);
        }

        let head = ldr.wrapping_add(offset_of!(PebLdrData64, in_load_order_module_list) as u64);
        let links = required("loader list head", head, reader.read_struct::<ListEntry64>(pid, head))?;

        Ok(LoaderListHead {
            head,
            first: Va(links.flink),
        })
    }

    fn read_entry<Driver>(
        reader: &StealthyReader<Driver>,
        pid: ProcessId,
        link: Va,
    ) -> Result<Self::Entry, HvxError>
    where
        Driver: HvxDriver,
    {
        let entry = link.wrapping_sub(offset_of!(LdrDataTableEntry64, in_load_order_links) as u64);
        reader.read_struct(pid, entry)
    }
}

impl LoaderEntry for LdrDataTableEntry64 {
    fn dll_base(&self) -> Va {
        Va(self.dll_base)
    }

    fn size_of_image(&self) -> u64 {
        u64::from(self.size_of_image)
    }

    fn next(&self) -> Va {
        Va(self.in_load_order_links.flink)
    }

    fn full_dll_name(&self) -> RemoteUnicodeString {
        self.full_dll_name.into()
    }

    fn base_dll_name(&self) -> RemoteUnicodeString {
        self.base_dll_name.into()
    }
}
