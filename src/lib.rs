//! Guest introspection and transparency core for a hypervisor-based debugger.
//!
//! This crate re-exports the member crates of the workspace:
//!
//! - [`core`]: address types, errors, collaborator traits and the stealthy
//!   cross-address-space memory reader.
//! - [`os::windows`]: loader-structure walking and module enumeration.
//! - [`evade`]: syscall-number resolution and the transparent-mode engine.
//! - [`driver::memory`]: an in-memory guest implementing every collaborator.

pub use hvx_core as core;

/// Operating-system specific introspection.
pub mod os {
    #[cfg(feature = "os-windows")]
    pub use hvx_os_windows as windows;
}

/// Collaborator implementations.
pub mod driver {
    #[cfg(feature = "driver-memory")]
    pub use hvx_driver_memory as memory;
}

#[cfg(feature = "evade")]
pub use hvx_evade as evade;

pub use hvx_core::{HvxDriver, HvxError, Pa, ProcessId, StealthyReader, Va};
