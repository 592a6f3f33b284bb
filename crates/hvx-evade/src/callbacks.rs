use hvx_core::{HvxDriver, HvxError, PAGE_SIZE, ProcessId, StealthyReader, Va};
use tracing::Level;

/// Destination of the hide backend's log messages.
pub trait LogSink {
    /// Records a message.
    fn log(&self, level: Level, message: &str);
}

/// Memory of the debugged process, as seen by the hide backend.
pub trait TargetMemory {
    /// Returns `true` if `[va, va + len)` is mapped and safe to access.
    fn check_access(&self, pid: ProcessId, va: Va, len: usize) -> bool;

    /// Reads target memory.
    fn read(&self, pid: ProcessId, va: Va, buffer: &mut [u8]) -> Result<(), HvxError>;

    /// Writes target memory.
    fn write(&self, pid: ProcessId, va: Va, buffer: &[u8]) -> Result<(), HvxError>;
}

/// Resolves the image name of a process.
pub trait ProcessNames {
    /// Returns the image name of `pid`, if the process exists.
    fn process_name(&self, pid: ProcessId) -> Option<String>;
}

/// Single-stepping over the `syscall` epilogue.
pub trait TrapFlag {
    /// Arms the trap flag so that `core` stops right after the current
    /// system call of `thread_id` returns. `context` is handed back to the
    /// handler.
    fn set_after_syscall(&self, core: u32, pid: ProcessId, thread_id: u32, context: u64) -> bool;

    /// Handles a trap-flag exit on `core`. Returns `true` if the exit was
    /// caused by [`set_after_syscall`].
    ///
    /// [`set_after_syscall`]: Self::set_after_syscall
    fn handle(&self, core: u32) -> bool;
}

/// Injects exceptions into the guest.
pub trait ExceptionInjector {
    /// Injects a general-protection fault on `core`.
    fn inject_general_protection(&self, core: u32);
}

/// Collaborators handed to the interception subsystem and the hide backend.
#[derive(Clone, Copy)]
pub struct EvadeCallbacks<'a> {
    /// Log sink.
    pub log: &'a dyn LogSink,

    /// Target memory access.
    pub memory: &'a dyn TargetMemory,

    /// Process name lookup.
    pub process_names: &'a dyn ProcessNames,

    /// Trap-flag handling.
    pub trap_flag: &'a dyn TrapFlag,

    /// Exception injection.
    pub exceptions: &'a dyn ExceptionInjector,
}

/// A [`LogSink`] that forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "hvx_evade::backend", "{message}"),
            Level::WARN => tracing::warn!(target: "hvx_evade::backend", "{message}"),
            Level::INFO => tracing::info!(target: "hvx_evade::backend", "{message}"),
            Level::DEBUG => tracing::debug!(target: "hvx_evade::backend", "{message}"),
            _ => tracing::trace!(target: "hvx_evade::backend", "{message}"),
        }
    }
}

/// A [`TargetMemory`] on top of the [`StealthyReader`].
pub struct StealthyTargetMemory<'a, Driver>
where
    Driver: HvxDriver,
{
    reader: StealthyReader<'a, Driver>,
}

impl<'a, Driver> StealthyTargetMemory<'a, Driver>
where
    Driver: HvxDriver,
{
    /// Creates a new target memory accessor.
    pub fn new(reader: StealthyReader<'a, Driver>) -> Self {
        Self { reader }
    }
}

impl<Driver> TargetMemory for StealthyTargetMemory<'_, Driver>
where
    Driver: HvxDriver,
{
    fn check_access(&self, pid: ProcessId, va: Va, len: usize) -> bool {
        if len == 0 {
            return false;
        }

        let Ok(root) = self.reader.page_table_root(pid) else {
            return false;
        };

        let Some(last) = va.0.checked_add(len as u64 - 1) else {
            return false;
        };

        let driver = self.reader.driver();
        let mut page = va.0 & !(PAGE_SIZE - 1);
        loop {
            if driver.translate(root, Va(page)).is_none() {
                return false;
            }

            match page.checked_add(PAGE_SIZE) {
                Some(next) if next <= last => page = next,
                _ => return true,
            }
        }
    }

    fn read(&self, pid: ProcessId, va: Va, buffer: &mut [u8]) -> Result<(), HvxError> {
        self.reader.read_process_memory(pid, va, buffer)
    }

    fn write(&self, pid: ProcessId, va: Va, buffer: &[u8]) -> Result<(), HvxError> {
        self.reader.write_process_memory(pid, va, buffer)
    }
}
