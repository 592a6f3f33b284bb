use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{ListEntry32, ListEntry64, UnicodeString32, UnicodeString64};

/// Prefix of the 64-bit loader data.
///
/// # Implementation Details
///
/// Corresponds to `_PEB_LDR_DATA` (x64).
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PebLdrData64 {
    /// `Length`.
    pub length: u32,

    /// `Initialized`.
    pub initialized: u8,

    /// Alignment padding.
    pub padding0: [u8; 3],

    /// `SsHandle`.
    pub ss_handle: u64,

    /// `InLoadOrderModuleList`, links [`LdrDataTableEntry64::in_load_order_links`].
    pub in_load_order_module_list: ListEntry64,

    /// `InMemoryOrderModuleList`.
    pub in_memory_order_module_list: ListEntry64,

    /// `InInitializationOrderModuleList`.
    pub in_initialization_order_module_list: ListEntry64,
}

/// Prefix of the 32-bit loader data of a WoW64 process.
///
/// # Implementation Details
///
/// Corresponds to `_PEB_LDR_DATA32`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PebLdrData32 {
    /// `Length`.
    pub length: u32,

    /// `Initialized`.
    pub initialized: u8,

    /// Alignment padding.
    pub padding0: [u8; 3],

    /// `SsHandle`.
    pub ss_handle: u32,

    /// `InLoadOrderModuleList`, links [`LdrDataTableEntry32::in_load_order_links`].
    pub in_load_order_module_list: ListEntry32,

    /// `InMemoryOrderModuleList`.
    pub in_memory_order_module_list: ListEntry32,

    /// `InInitializationOrderModuleList`.
    pub in_initialization_order_module_list: ListEntry32,
}

/// Prefix of a 64-bit loader module entry.
///
/// # Implementation Details
///
/// Corresponds to `_LDR_DATA_TABLE_ENTRY` (x64).
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct LdrDataTableEntry64 {
    /// `InLoadOrderLinks`.
    pub in_load_order_links: ListEntry64,

    /// `InMemoryOrderLinks`.
    pub in_memory_order_links: ListEntry64,

    /// `InInitializationOrderLinks`.
    pub in_initialization_order_links: ListEntry64,

    /// `DllBase`.
    pub dll_base: u64,

    /// `EntryPoint`.
    pub entry_point: u64,

    /// `SizeOfImage`.
    pub size_of_image: u32,

    /// Alignment padding.
    pub padding0: u32,

    /// `FullDllName`.
    pub full_dll_name: UnicodeString64,

    /// `BaseDllName`.
    pub base_dll_name: UnicodeString64,
}

/// Prefix of a 32-bit loader module entry of a WoW64 process.
///
/// # Implementation Details
///
/// Corresponds to `_LDR_DATA_TABLE_ENTRY32`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct LdrDataTableEntry32 {
    /// `InLoadOrderLinks`.
    pub in_load_order_links: ListEntry32,

    /// `InMemoryOrderLinks`.
    pub in_memory_order_links: ListEntry32,

    /// `InInitializationOrderLinks`.
    pub in_initialization_order_links: ListEntry32,

    /// `DllBase`.
    pub dll_base: u32,

    /// `EntryPoint`.
    pub entry_point: u32,

    /// `SizeOfImage`.
    pub size_of_image: u32,

    /// `FullDllName`.
    pub full_dll_name: UnicodeString32,

    /// `BaseDllName`.
    pub base_dll_name: UnicodeString32,
}
