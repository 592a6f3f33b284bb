use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::{HvxDriver, HvxError, PAGE_SIZE, Pa, ProcessAddressSpace, ProcessId, Va};

/// Returns the length of the next chunk of a transfer starting at `va`.
///
/// A chunk never crosses a page boundary: virtually contiguous pages are
/// not guaranteed to be physically contiguous.
pub fn page_chunk_len(va: Va, remaining: usize) -> usize {
    let to_page_end = (PAGE_SIZE - va.page_offset()) as usize;
    to_page_end.min(remaining)
}

/// Page-aware reader of another process's memory.
///
/// Every transfer resolves the process's page-table root once, then
/// translates and copies one page-bounded chunk at a time through the
/// driver's physical memory accessor. Transfers are all-or-nothing: if any
/// chunk fails, the whole operation fails and the buffer contents are
/// unspecified.
pub struct StealthyReader<'a, Driver>
where
    Driver: HvxDriver,
{
    driver: &'a Driver,
}

impl<Driver> Clone for StealthyReader<'_, Driver>
where
    Driver: HvxDriver,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<Driver> Copy for StealthyReader<'_, Driver> where Driver: HvxDriver {}

impl<'a, Driver> StealthyReader<'a, Driver>
where
    Driver: HvxDriver,
{
    /// Creates a new reader over the given driver.
    pub fn new(driver: &'a Driver) -> Self {
        Self { driver }
    }

    /// Returns the underlying driver.
    pub fn driver(&self) -> &'a Driver {
        self.driver
    }

    /// Resolves the page-table root of a process.
    ///
    /// Fails with [`HvxError::InvalidParameter`] if the process is unknown.
    pub fn page_table_root(&self, pid: ProcessId) -> Result<Pa, HvxError> {
        match self.driver.page_table_root(pid) {
            Some(root) if !root.is_null() => Ok(root),
            _ => {
                tracing::debug!(%pid, "page-table root not found");
                Err(HvxError::InvalidParameter)
            }
        }
    }

    /// Derives the address space of a process for a single operation.
    pub fn address_space(&self, pid: ProcessId) -> Result<ProcessAddressSpace, HvxError> {
        let root = self.page_table_root(pid)?;
        let process = self
            .driver
            .lookup_process(pid)
            .ok_or(HvxError::InvalidParameter)?;

        Ok(ProcessAddressSpace {
            process_id: pid,
            root,
            bitness: process.bitness(),
        })
    }

    /// Reads `buffer.len()` bytes of process memory starting at `va`.
    ///
    /// # Errors
    ///
    /// - [`HvxError::InvalidParameter`] if `buffer` is empty or the process
    ///   does not exist. No physical read is issued in either case.
    /// - [`HvxError::InvalidAddress`] if any page of the range is unmapped.
    /// - [`HvxError::Unsuccessful`] if any physical read fails.
    pub fn read_process_memory(
        &self,
        pid: ProcessId,
        va: Va,
        buffer: &mut [u8],
    ) -> Result<(), HvxError> {
        if buffer.is_empty() {
            return Err(HvxError::InvalidParameter);
        }

        let root = self.page_table_root(pid)?;
        self.read_in(root, va, buffer)
    }

    fn read_in(&self, root: Pa, va: Va, buffer: &mut [u8]) -> Result<(), HvxError> {
        let mut position = 0usize;

        while position < buffer.len() {
            let current = va.wrapping_add(position as u64);
            let size = page_chunk_len(current, buffer.len() - position);
            let pa = self.translate(root, current)?;

            if let Err(err) = self
                .driver
                .read_physical(pa, &mut buffer[position..position + size])
            {
                tracing::trace!(%current, %pa, size, %err, "physical read failed");
                return Err(HvxError::Unsuccessful);
            }

            position += size;
        }

        Ok(())
    }

    /// Writes `buffer` into process memory starting at `va`.
    ///
    /// Uses the same page-bounded chunking and error mapping as
    /// [`read_process_memory`].
    ///
    /// [`read_process_memory`]: Self::read_process_memory
    pub fn write_process_memory(
        &self,
        pid: ProcessId,
        va: Va,
        buffer: &[u8],
    ) -> Result<(), HvxError> {
        if buffer.is_empty() {
            return Err(HvxError::InvalidParameter);
        }

        let root = self.page_table_root(pid)?;
        let mut position = 0usize;

        while position < buffer.len() {
            let current = va.wrapping_add(position as u64);
            let size = page_chunk_len(current, buffer.len() - position);
            let pa = self.translate(root, current)?;

            if let Err(err) = self
                .driver
                .write_physical(pa, &buffer[position..position + size])
            {
                tracing::trace!(%current, %pa, size, %err, "physical write failed");
                return Err(HvxError::Unsuccessful);
            }

            position += size;
        }

        Ok(())
    }

    /// Reads `len` bytes of process memory into a new vector.
    pub fn read_bytes(&self, pid: ProcessId, va: Va, len: usize) -> Result<Vec<u8>, HvxError> {
        let mut buffer = vec![0u8; len];
        self.read_process_memory(pid, va, &mut buffer)?;
        Ok(buffer)
    }

    /// Reads a plain-data structure from process memory.
    pub fn read_struct<T>(&self, pid: ProcessId, va: Va) -> Result<T, HvxError>
    where
        T: FromBytes + IntoBytes,
    {
        let mut result = T::new_zeroed();
        self.read_process_memory(pid, va, result.as_mut_bytes())?;
        Ok(result)
    }

    /// Writes a plain-data structure into process memory.
    pub fn write_struct<T>(&self, pid: ProcessId, va: Va, value: &T) -> Result<(), HvxError>
    where
        T: IntoBytes + Immutable,
    {
        self.write_process_memory(pid, va, value.as_bytes())
    }

    /// Reads a single byte.
    pub fn read_u8(&self, pid: ProcessId, va: Va) -> Result<u8, HvxError> {
        let mut buffer = [0u8; 1];
        self.read_process_memory(pid, va, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Reads a little-endian 16-bit unsigned integer.
    pub fn read_u16(&self, pid: ProcessId, va: Va) -> Result<u16, HvxError> {
        let mut buffer = [0u8; 2];
        self.read_process_memory(pid, va, &mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }

    /// Reads a little-endian 32-bit unsigned integer.
    pub fn read_u32(&self, pid: ProcessId, va: Va) -> Result<u32, HvxError> {
        let mut buffer = [0u8; 4];
        self.read_process_memory(pid, va, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Reads a little-endian 64-bit unsigned integer.
    pub fn read_u64(&self, pid: ProcessId, va: Va) -> Result<u64, HvxError> {
        let mut buffer = [0u8; 8];
        self.read_process_memory(pid, va, &mut buffer)?;
        Ok(u64::from_le_bytes(buffer))
    }

    /// Reads a 32-bit pointer.
    pub fn read_va32(&self, pid: ProcessId, va: Va) -> Result<Va, HvxError> {
        Ok(Va::from(self.read_u32(pid, va)?))
    }

    /// Reads a 64-bit pointer.
    pub fn read_va64(&self, pid: ProcessId, va: Va) -> Result<Va, HvxError> {
        Ok(Va(self.read_u64(pid, va)?))
    }

    fn translate(&self, root: Pa, va: Va) -> Result<Pa, HvxError> {
        match self.driver.translate(root, va) {
            Some(pa) => Ok(pa),
            None => {
                tracing::trace!(%root, %va, "address not mapped");
                Err(HvxError::InvalidAddress(va))
            }
        }
    }
}
