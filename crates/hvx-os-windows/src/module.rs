use hvx_core::{Bitness, HvxDriver, HvxError, ProcessId, ProcessObject, StealthyReader, Va};

use crate::loader::{LoaderEntry, LoaderLayout, LoaderWalk, Native64Layout, Wow64Layout};

/// Default capacity of module name and path strings, in UTF-16 units
/// including the terminator.
pub const MODULE_NAME_CAPACITY: usize = 260;

/// A module loaded in a target process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    /// Base address of the module image.
    pub base_address: Va,

    /// Size of the module image in bytes.
    pub size: u64,

    /// File name of the module, e.g. `ntdll.dll`.
    pub name: String,

    /// Full path of the module.
    pub path: String,
}

/// Result of a module enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleEnumeration {
    /// Collected records, at most the requested capacity.
    pub records: Vec<ModuleRecord>,

    /// Number of modules visited by the traversal. May exceed
    /// `records.len()`.
    pub total_seen: usize,
}

impl ModuleEnumeration {
    /// Returns `true` if more modules were seen than collected.
    pub fn is_truncated(&self) -> bool {
        self.total_seen > self.records.len()
    }
}

/// Reconstructs the module list of a target process from its loader data.
pub struct ModuleEnumerator<'a, Driver>
where
    Driver: HvxDriver,
{
    reader: StealthyReader<'a, Driver>,
    string_capacity: usize,
}

impl<'a, Driver> ModuleEnumerator<'a, Driver>
where
    Driver: HvxDriver,
{
    /// Creates a new enumerator on top of `reader`.
    pub fn new(reader: StealthyReader<'a, Driver>) -> Self {
        Self {
            reader,
            string_capacity: MODULE_NAME_CAPACITY,
        }
    }

    /// Sets the capacity of module name and path strings, in UTF-16 units
    /// including the terminator.
    pub fn with_string_capacity(self, string_capacity: usize) -> Self {
        Self {
            string_capacity,
            ..self
        }
    }

    /// Returns the underlying reader.
    pub fn reader(&self) -> StealthyReader<'a, Driver> {
        self.reader
    }

    /// Enumerates the modules of a process, collecting at most `capacity`
    /// records.
    ///
    /// The traversal continues past `capacity` so that
    /// [`ModuleEnumeration::total_seen`] reflects the true count.
    ///
    /// # Errors
    ///
    /// - [`HvxError::InvalidParameter`] if the process does not exist.
    /// - [`HvxError::Unsuccessful`] if the environment block, the loader
    ///   data or the list head cannot be read.
    pub fn enumerate_modules(
        &self,
        pid: ProcessId,
        capacity: usize,
    ) -> Result<ModuleEnumeration, HvxError> {
        let (process, peb) = self.process(pid)?;

        match process.bitness() {
            Bitness::Native64 => self.collect::<Native64Layout>(pid, peb, capacity),
            Bitness::Wow64On64 => self.collect::<Wow64Layout>(pid, peb, capacity),
        }
    }

    /// Finds the first module whose file name matches `name`, ignoring case.
    ///
    /// # Errors
    ///
    /// - [`HvxError::InvalidParameter`] if `name` is empty or the process
    ///   does not exist.
    /// - [`HvxError::Unsuccessful`] if the loader list cannot be located.
    /// - [`HvxError::NotFound`] if no module matches.
    pub fn find_module(&self, pid: ProcessId, name: &str) -> Result<ModuleRecord, HvxError> {
        if name.is_empty() {
            return Err(HvxError::InvalidParameter);
        }

        let (process, peb) = self.process(pid)?;

        match process.bitness() {
            Bitness::Native64 => self.search::<Native64Layout>(pid, peb, name),
            Bitness::Wow64On64 => self.search::<Wow64Layout>(pid, peb, name),
        }
    }

    /// Finds the base address of the first module whose file name matches
    /// `name`, ignoring case.
    ///
    /// See [`find_module`] for the possible errors.
    ///
    /// [`find_module`]: Self::find_module
    pub fn find_module_base(&self, pid: ProcessId, name: &str) -> Result<Va, HvxError> {
        Ok(self.find_module(pid, name)?.base_address)
    }

    fn process(&self, pid: ProcessId) -> Result<(ProcessObject, Va), HvxError> {
        self.reader.page_table_root(pid)?;

        let process = match self.reader.driver().lookup_process(pid) {
            Some(process) => process,
            None => {
                tracing::debug!(%pid, "process not found");
                return Err(HvxError::InvalidParameter);
            }
        };

        let peb = process.environment_block();
        if peb.is_null() {
            tracing::debug!(%pid, bitness = ?process.bitness(), "process has no environment block");
            return Err(HvxError::Unsuccessful);
        }

        Ok((process, peb))
    }

    fn collect<Layout>(
        &self,
        pid: ProcessId,
        peb: Va,
        capacity: usize,
    ) -> Result<ModuleEnumeration, HvxError>
    where
        Layout: LoaderLayout,
    {
        let mut walk = LoaderWalk::<Driver, Layout>::new(self.reader, pid, peb)?;
        let mut result = ModuleEnumeration::default();

        for entry in &mut walk {
            if result.total_seen < capacity {
                result.records.push(self.record(pid, &entry));
            }

            result.total_seen += 1;
        }

        tracing::debug!(
            %pid,
            collected = result.records.len(),
            total_seen = result.total_seen,
            stop = ?walk.stop_reason(),
            "modules enumerated"
        );

        Ok(result)
    }

    fn search<Layout>(&self, pid: ProcessId, peb: Va, name: &str) -> Result<ModuleRecord, HvxError>
    where
        Layout: LoaderLayout,
    {
        let mut walk = LoaderWalk::<Driver, Layout>::new(self.reader, pid, peb)?;

        for entry in &mut walk {
            let base_name = entry
                .base_dll_name()
                .read_bounded(&self.reader, pid, self.string_capacity);

            if eq_ignore_case(&base_name, name) {
                return Ok(ModuleRecord {
                    base_address: entry.dll_base(),
                    size: entry.size_of_image(),
                    name: base_name,
                    path: entry
                        .full_dll_name()
                        .read_bounded(&self.reader, pid, self.string_capacity),
                });
            }
        }

        tracing::debug!(%pid, name, stop = ?walk.stop_reason(), "module not found");
        Err(HvxError::NotFound)
    }

    fn record(&self, pid: ProcessId, entry: &impl LoaderEntry) -> ModuleRecord {
        ModuleRecord {
            base_address: entry.dll_base(),
            size: entry.size_of_image(),
            name: entry
                .base_dll_name()
                .read_bounded(&self.reader, pid, self.string_capacity),
            path: entry
                .full_dll_name()
                .read_bounded(&self.reader, pid, self.string_capacity),
        }
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

#[cfg(test)]
#[path = "module_tests.rs"]
mod tests;
