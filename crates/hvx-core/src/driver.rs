use crate::{HvxError, Pa, ProcessId, ProcessObject, Va};

/// Safe access to guest physical memory.
///
/// Implementations must never fault the privileged context: an access to a
/// physical range that cannot be mapped is reported as an error.
pub trait PhysicalMemory {
    /// Copies `buffer.len()` bytes starting at `pa` into `buffer`.
    fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), HvxError>;

    /// Copies `buffer` into guest physical memory starting at `pa`.
    fn write_physical(&self, pa: Pa, buffer: &[u8]) -> Result<(), HvxError>;
}

/// Virtual-to-physical translation of guest addresses.
pub trait AddressTranslator {
    /// Returns the page-table root (CR3) of the process.
    ///
    /// `None` or a zero root means the process was not found.
    fn page_table_root(&self, pid: ProcessId) -> Option<Pa>;

    /// Translates `va` through the page tables anchored at `root`.
    ///
    /// Returns `None` if the address is not mapped.
    fn translate(&self, root: Pa, va: Va) -> Option<Pa>;
}

/// Lookup of guest process objects.
pub trait ProcessResolver {
    /// Returns what is known about the process, or `None` if it does not
    /// exist.
    fn lookup_process(&self, pid: ProcessId) -> Option<ProcessObject>;
}

/// Every collaborator the introspection core consumes.
///
/// Blanket-implemented for any type implementing the three component
/// traits.
pub trait HvxDriver: PhysicalMemory + AddressTranslator + ProcessResolver {}

impl<T> HvxDriver for T where T: PhysicalMemory + AddressTranslator + ProcessResolver {}
