use serde::{Deserialize, Serialize};

use super::{Pa, ProcessId, Va};

/// Layout family of a process's user-mode loader structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bitness {
    /// Native 64-bit process.
    Native64,

    /// 32-bit process hosted by the WoW64 environment of a 64-bit system.
    Wow64On64,
}

impl Bitness {
    /// Returns the width of a user-mode pointer in bytes.
    pub const fn pointer_width(self) -> usize {
        match self {
            Self::Native64 => 8,
            Self::Wow64On64 => 4,
        }
    }
}

/// What the process resolver knows about a live process.
///
/// # Implementation Details
///
/// `peb` corresponds to `PsGetProcessPeb()`, `wow64_peb` to
/// `PsGetProcessWow64Process()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessObject {
    /// The process identifier.
    pub id: ProcessId,

    /// Address of the native (64-bit) process environment block.
    pub peb: Va,

    /// Address of the 32-bit process environment block, if the process
    /// runs under WoW64.
    pub wow64_peb: Option<Va>,
}

impl ProcessObject {
    /// Returns the loader layout family of the process.
    pub fn bitness(&self) -> Bitness {
        match self.wow64_peb {
            Some(_) => Bitness::Wow64On64,
            None => Bitness::Native64,
        }
    }

    /// Returns the environment block matching [`bitness`].
    ///
    /// [`bitness`]: Self::bitness
    pub fn environment_block(&self) -> Va {
        self.wow64_peb.unwrap_or(self.peb)
    }
}

/// The address space of a process, derived for the duration of one
/// operation.
///
/// Never cache this beyond a single call: the process may exit or be
/// replaced by a process with the same identifier at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessAddressSpace {
    /// The process identifier.
    pub process_id: ProcessId,

    /// The page-table root (CR3) of the process.
    pub root: Pa,

    /// The loader layout family of the process.
    pub bitness: Bitness,
}
