use hvx_core::{HvxDriver, HvxError, ProcessId, StealthyReader, Va};
use hvx_os_windows::{ModuleEnumerator, RemoteImage};
use indexmap::IndexMap;

use crate::SyscallSource;

/// System-service stubs exported by a module of a target process, usually
/// `ntdll.dll`.
///
/// The export table is read once, when the source is created. Code bytes
/// are read on demand.
pub struct ProcessImageSource<'a, Driver>
where
    Driver: HvxDriver,
{
    reader: StealthyReader<'a, Driver>,
    pid: ProcessId,
    base: Va,
    exports: IndexMap<String, Va>,
}

impl<'a, Driver> ProcessImageSource<'a, Driver>
where
    Driver: HvxDriver,
{
    /// Locates `module` in the process and reads its export table.
    pub fn new(
        reader: StealthyReader<'a, Driver>,
        pid: ProcessId,
        module: &str,
    ) -> Result<Self, HvxError> {
        let base = ModuleEnumerator::new(reader).find_module_base(pid, module)?;
        let bitness = reader.address_space(pid)?.bitness;
        let exports = RemoteImage::new(reader, pid, base, bitness).exports()?;

        tracing::debug!(%pid, module, %base, exports = exports.len(), "syscall source ready");

        Ok(Self {
            reader,
            pid,
            base,
            exports,
        })
    }

    /// Returns the base address of the module.
    pub fn base_address(&self) -> Va {
        self.base
    }
}

impl<Driver> SyscallSource for ProcessImageSource<'_, Driver>
where
    Driver: HvxDriver,
{
    fn routine_address(&self, name: &str) -> Option<Va> {
        self.exports.get(name).copied()
    }

    fn read_code(&self, va: Va, buffer: &mut [u8]) -> Result<(), HvxError> {
        self.reader.read_process_memory(self.pid, va, buffer)
    }
}
