use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::decode::{INVALID_SYSCALL_NUMBER, SyscallSource, decode_syscall_number};

/// Whether transparent mode may run without a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    /// The routine must resolve for full coverage.
    Required,

    /// The routine may be missing on some builds of the system.
    Optional,
}

/// A system service intercepted by transparent mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyscallRoutine {
    /// `NtQuerySystemInformation`
    QuerySystemInformation,

    /// `NtQuerySystemInformationEx`
    QuerySystemInformationEx,

    /// `NtSystemDebugControl`
    SystemDebugControl,

    /// `NtQueryAttributesFile`
    QueryAttributesFile,

    /// `NtOpenDirectoryObject`
    OpenDirectoryObject,

    /// `NtQueryDirectoryObject`
    QueryDirectoryObject,

    /// `NtQueryInformationProcess`
    QueryInformationProcess,

    /// `NtSetInformationProcess`
    SetInformationProcess,

    /// `NtQueryInformationThread`
    QueryInformationThread,

    /// `NtSetInformationThread`
    SetInformationThread,

    /// `NtOpenFile`
    OpenFile,

    /// `NtOpenKey`
    OpenKey,

    /// `NtOpenKeyEx`
    OpenKeyEx,

    /// `NtQueryValueKey`
    QueryValueKey,

    /// `NtEnumerateKey`
    EnumerateKey,
}

impl SyscallRoutine {
    /// Every intercepted routine, in resolution order.
    pub const ALL: [Self; 15] = [
        Self::QuerySystemInformation,
        Self::QuerySystemInformationEx,
        Self::SystemDebugControl,
        Self::QueryAttributesFile,
        Self::OpenDirectoryObject,
        Self::QueryDirectoryObject,
        Self::QueryInformationProcess,
        Self::SetInformationProcess,
        Self::QueryInformationThread,
        Self::SetInformationThread,
        Self::OpenFile,
        Self::OpenKey,
        Self::OpenKeyEx,
        Self::QueryValueKey,
        Self::EnumerateKey,
    ];

    /// Returns the name of the exported stub the number is decoded from.
    pub const fn routine_name(self) -> &'static str {
        match self {
            Self::QuerySystemInformation => "ZwQuerySystemInformation",
            Self::QuerySystemInformationEx => "ZwQuerySystemInformationEx",
            Self::SystemDebugControl => "ZwSystemDebugControl",
            Self::QueryAttributesFile => "ZwQueryAttributesFile",
            Self::OpenDirectoryObject => "ZwOpenDirectoryObject",
            Self::QueryDirectoryObject => "ZwQueryDirectoryObject",
            Self::QueryInformationProcess => "ZwQueryInformationProcess",
            Self::SetInformationProcess => "ZwSetInformationProcess",
            Self::QueryInformationThread => "ZwQueryInformationThread",
            Self::SetInformationThread => "ZwSetInformationThread",
            Self::OpenFile => "ZwOpenFile",
            Self::OpenKey => "ZwOpenKey",
            Self::OpenKeyEx => "ZwOpenKeyEx",
            Self::QueryValueKey => "ZwQueryValueKey",
            Self::EnumerateKey => "ZwEnumerateKey",
        }
    }

    /// Returns whether the routine is needed for full coverage.
    pub const fn requirement(self) -> Requirement {
        match self {
            Self::QuerySystemInformationEx | Self::OpenKeyEx => Requirement::Optional,
            _ => Requirement::Required,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Routines that failed to resolve.
pub type UnresolvedRoutines = SmallVec<[SyscallRoutine; 4]>;

/// How much of the intercepted surface transparent mode covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coverage {
    /// Every routine resolved.
    Full,

    /// Some routines did not resolve and are not intercepted.
    Partial {
        /// The unresolved routines.
        unresolved: UnresolvedRoutines,
    },
}

impl Coverage {
    /// Returns `true` if every routine resolved.
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Resolved system-service numbers of the intercepted routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallNumberTable {
    numbers: [u32; SyscallRoutine::ALL.len()],
    fully_resolved: bool,
}

impl Default for SyscallNumberTable {
    fn default() -> Self {
        Self {
            numbers: [INVALID_SYSCALL_NUMBER; SyscallRoutine::ALL.len()],
            fully_resolved: false,
        }
    }
}

impl SyscallNumberTable {
    /// Resolves every routine through `source`.
    ///
    /// A routine that fails to resolve is recorded as
    /// [`INVALID_SYSCALL_NUMBER`]. Resolution always continues with the
    /// remaining routines.
    pub fn resolve(source: &(impl SyscallSource + ?Sized)) -> Self {
        let mut table = Self {
            fully_resolved: true,
            ..Self::default()
        };

        for routine in SyscallRoutine::ALL {
            let name = routine.routine_name();
            let number = source
                .routine_address(name)
                .and_then(|va| decode_syscall_number(source, va))
                .unwrap_or(INVALID_SYSCALL_NUMBER);

            table.numbers[routine.index()] = number;

            if number != INVALID_SYSCALL_NUMBER {
                tracing::trace!(name, number, "syscall number resolved");
                continue;
            }

            match routine.requirement() {
                Requirement::Optional => {
                    tracing::debug!(name, "optional system routine is unavailable");
                }
                Requirement::Required => {
                    tracing::warn!(
                        name,
                        "unable to resolve syscall number; transparency coverage might be limited"
                    );
                    table.fully_resolved = false;
                }
            }
        }

        table
    }

    /// Returns the number of `routine`, or `None` if it did not resolve.
    pub fn get(&self, routine: SyscallRoutine) -> Option<u32> {
        match self.numbers[routine.index()] {
            INVALID_SYSCALL_NUMBER => None,
            number => Some(number),
        }
    }

    /// Returns the number of `routine`, or [`INVALID_SYSCALL_NUMBER`].
    pub fn raw(&self, routine: SyscallRoutine) -> u32 {
        self.numbers[routine.index()]
    }

    /// Returns `true` if every required routine resolved.
    pub fn fully_resolved(&self) -> bool {
        self.fully_resolved
    }

    /// Returns the routines that did not resolve, required or not.
    pub fn unresolved(&self) -> UnresolvedRoutines {
        SyscallRoutine::ALL
            .into_iter()
            .filter(|&routine| self.get(routine).is_none())
            .collect()
    }

    /// Returns the coverage this table provides.
    pub fn coverage(&self) -> Coverage {
        let unresolved = self.unresolved();
        if unresolved.is_empty() {
            Coverage::Full
        }
        else {
            Coverage::Partial { unresolved }
        }
    }

    /// Iterates over the routines and their numbers, resolved or not.
    pub fn iter(&self) -> impl Iterator<Item = (SyscallRoutine, Option<u32>)> + '_ {
        SyscallRoutine::ALL
            .into_iter()
            .map(|routine| (routine, self.get(routine)))
    }
}
