//! Windows loader-structure introspection.
//!
//! Reconstructs the module list of a target process from its loader data,
//! for both native 64-bit processes and 32-bit processes running under
//! WoW64, and reads the export table of a module mapped in the target.

pub mod comps;
mod error;
#[cfg(any(test, feature = "fixture"))]
pub mod fixture;
pub mod loader;
mod module;
mod pe;

pub use self::{
    error::WindowsError,
    loader::{LoaderEntry, LoaderLayout, LoaderWalk, LoaderWalkCursor, WalkStop},
    module::{MODULE_NAME_CAPACITY, ModuleEnumeration, ModuleEnumerator, ModuleRecord},
    pe::RemoteImage,
};
