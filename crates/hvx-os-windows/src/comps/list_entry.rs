use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// A doubly-linked list link in a 64-bit address space.
///
/// # Implementation Details
///
/// Corresponds to `LIST_ENTRY64`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ListEntry64 {
    /// Forward link.
    pub flink: u64,

    /// Backward link.
    pub blink: u64,
}

/// A doubly-linked list link in a 32-bit address space.
///
/// # Implementation Details
///
/// Corresponds to `LIST_ENTRY32`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ListEntry32 {
    /// Forward link.
    pub flink: u32,

    /// Backward link.
    pub blink: u32,
}
