//! Bitness-specific traversal of the in-load-order module list.
//!
//! The native 64-bit and the WoW64 loader structures differ in pointer
//! width, string descriptor width and field offsets. Each family is a
//! separate [`LoaderLayout`]; the [`LoaderWalk`] skeleton is shared.

mod native64;
mod walk;
mod wow64;

use hvx_core::{Bitness, HvxDriver, HvxError, ProcessId, StealthyReader, Va};

pub use self::{
    native64::Native64Layout,
    walk::{LoaderWalk, LoaderWalkCursor, WalkStop},
    wow64::Wow64Layout,
};
use crate::comps::RemoteUnicodeString;

/// The in-load-order list as seen from the loader data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderListHead {
    /// Address of the list head embedded in the loader data.
    pub head: Va,

    /// Forward link of the list head.
    pub first: Va,
}

/// One module entry of the loader list.
pub trait LoaderEntry {
    /// Base address of the module image.
    fn dll_base(&self) -> Va;

    /// Size of the module image in bytes.
    fn size_of_image(&self) -> u64;

    /// Forward link to the next node of the in-load-order list.
    fn next(&self) -> Va;

    /// Full path of the module.
    fn full_dll_name(&self) -> RemoteUnicodeString;

    /// File name of the module.
    fn base_dll_name(&self) -> RemoteUnicodeString;
}

/// A family of loader structure layouts.
pub trait LoaderLayout {
    /// Bitness of the processes using this layout.
    const BITNESS: Bitness;

    /// Maximum number of list nodes visited by one traversal.
    const ITERATION_CEILING: usize;

    /// The module entry type.
    type Entry: LoaderEntry;

    /// Locates the in-load-order list of the process whose environment
    /// block is at `peb`.
    ///
    /// Each of the reads involved must succeed; a failure is reported as
    /// [`HvxError::Unsuccessful`].
    fn list_head<Driver>(
        reader: &StealthyReader<Driver>,
        pid: ProcessId,
        peb: Va,
    ) -> Result<LoaderListHead, HvxError>
    where
        Driver: HvxDriver;

    /// Reads the module entry whose in-load-order link is at `link`.
    fn read_entry<Driver>(
        reader: &StealthyReader<Driver>,
        pid: ProcessId,
        link: Va,
    ) -> Result<Self::Entry, HvxError>
    where
        Driver: HvxDriver;
}

/// Maps the failure of a required intermediate read to
/// [`HvxError::Unsuccessful`].
fn required<T>(what: &'static str, va: Va, result: Result<T, HvxError>) -> Result<T, HvxError> {
    result.map_err(|err| {
        tracing::debug!(%va, %err, "failed to read {what}");
        HvxError::Unsuccessful
    })
}
