use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Prefix of the 64-bit process environment block.
///
/// # Implementation Details
///
/// Corresponds to `_PEB` (x64). `ldr` is at offset `0x18`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct Peb64 {
    /// `InheritedAddressSpace`.
    pub inherited_address_space: u8,

    /// `ReadImageFileExecOptions`.
    pub read_image_file_exec_options: u8,

    /// `BeingDebugged`.
    pub being_debugged: u8,

    /// `BitField`.
    pub bit_field: u8,

    /// Alignment padding.
    pub padding0: [u8; 4],

    /// `Mutant`.
    pub mutant: u64,

    /// `ImageBaseAddress`.
    pub image_base_address: u64,

    /// `Ldr`, pointer to [`PebLdrData64`].
    ///
    /// [`PebLdrData64`]: super::PebLdrData64
    pub ldr: u64,
}

/// Prefix of the 32-bit process environment block of a WoW64 process.
///
/// # Implementation Details
///
/// Corresponds to `_PEB32`. `ldr` is at offset `0x0c`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct Peb32 {
    /// `InheritedAddressSpace`.
    pub inherited_address_space: u8,

    /// `ReadImageFileExecOptions`.
    pub read_image_file_exec_options: u8,

    /// `BeingDebugged`.
    pub being_debugged: u8,

    /// `BitField`.
    pub bit_field: u8,

    /// `Mutant`.
    pub mutant: u32,

    /// `ImageBaseAddress`.
    pub image_base_address: u32,

    /// `Ldr`, pointer to [`PebLdrData32`].
    ///
    /// [`PebLdrData32`]: super::PebLdrData32
    pub ldr: u32,
}
