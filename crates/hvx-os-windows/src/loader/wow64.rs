use std::mem::offset_of;

use hvx_core::{Bitness, HvxDriver, HvxError, ProcessId, StealthyReader, Va};

use super::{LoaderEntry, LoaderLayout, LoaderListHead, required};
use crate::{
    WindowsError,
    comps::{LdrDataTableEntry32, ListEntry32, Peb32, PebLdrData32, RemoteUnicodeString},
};

/// Loader layout of 32-bit processes running under WoW64.
///
/// All pointers in these structures are 32 bits wide, and address
/// arithmetic wraps within the low 4 GiB.
pub struct Wow64Layout;

impl LoaderLayout for Wow64Layout {
    const BITNESS: Bitness = Bitness::Wow64On64;
    const ITERATION_CEILING: usize = 2048;

    type Entry = LdrDataTableEntry32;

    fn list_head<Driver>(
        reader: &StealthyReader<Driver>,
        pid: ProcessId,
        peb: Va,
    ) -> Result<LoaderListHead, HvxError>
    where
        Driver: HvxDriver,
    {
        let peb = required("PEB32", peb, reader.read_struct::<Peb32>(pid, peb))?;

        if peb.ldr == 0 {
            tracing::debug!(%pid, "PEB32 has no loader data");
            return Err(HvxError::Unsuccessful);
        }

        let head = Va::from(
            peb.ldr
                .wrapping_add(offset_of!(PebLdrData32, in_load_order_module_list) as u32),
        );
        let links = required("loader list head", head, reader.read_struct::<ListEntry32>(pid, head))?;

        Ok(LoaderListHead {
            head,
            first: Va::from(links.flink),
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
        // Links produced by this layout always fit; a wider one comes from a
        // caller driving the layout directly.
        let link = u32::try_from(link.0)
            .map_err(|_| WindowsError::CorruptedStruct("LIST_ENTRY32 link wider than 32 bits"))?;
        let entry = link.wrapping_sub(offset_of!(LdrDataTableEntry32, in_load_order_links) as u32);
        reader.read_struct(pid, Va::from(entry))
    }
}

impl LoaderEntry for LdrDataTableEntry32 {
    fn dll_base(&self) -> Va {
        Va::from(self.dll_base)
    }

    fn size_of_image(&self) -> u64 {
        u64::from(self.size_of_image)
    }

    fn next(&self) -> Va {
        Va::from(self.in_load_order_links.flink)
    }

    fn full_dll_name(&self) -> RemoteUnicodeString {
        self.full_dll_name.into()
    }

    fn base_dll_name(&self) -> RemoteUnicodeString {
        self.base_dll_name.into()
    }
}
