//! Transparent mode.
//!
//! Hides the debugger from introspection performed by the guest it is
//! debugging. The [`TransparencyEngine`] owns the hide state and drives a
//! syscall-interception subsystem and a hide backend. Before the first
//! hide, it resolves the numbers of the intercepted system services by
//! decoding the prologues of their stubs.

mod callbacks;
mod config;
mod decode;
mod engine;
mod source;
mod syscall;

pub use self::{
    callbacks::{
        EvadeCallbacks, ExceptionInjector, LogSink, ProcessNames, StealthyTargetMemory,
        TargetMemory, TracingLogSink, TrapFlag,
    },
    config::{CoveragePolicy, TransparencyConfig},
    decode::{INVALID_SYSCALL_NUMBER, SyscallSource, decode_syscall_number},
    engine::{EvadeHost, HideBackend, SyscallInterception, TransparencyEngine, TransparencyState},
    source::ProcessImageSource,
    syscall::{Coverage, Requirement, SyscallNumberTable, SyscallRoutine, UnresolvedRoutines},
};
