use hvx_core::{HvxDriver, ProcessId, StealthyReader, Va};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// A counted UTF-16 string descriptor in a 64-bit address space.
///
/// # Implementation Details
///
/// Corresponds to `_UNICODE_STRING` (x64).
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct UnicodeString64 {
    /// Length of the string in bytes, without the terminator.
    pub length: u16,

    /// Size of the buffer in bytes.
    pub maximum_length: u16,

    /// Alignment padding.
    pub padding0: u32,

    /// Address of the character buffer.
    pub buffer: u64,
}

impl UnicodeString64 {
    /// Creates a descriptor for `length` bytes at `buffer`.
    pub fn new(buffer: Va, length: u16) -> Self {
        Self {
            length,
            maximum_length: length.saturating_add(2),
            padding0: 0,
            buffer: buffer.0,
        }
    }
}

/// A counted UTF-16 string descriptor in a 32-bit address space.
///
/// # Implementation Details
///
/// Corresponds to `_STRING32`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct UnicodeString32 {
    /// Length of the string in bytes, without the terminator.
    pub length: u16,

    /// Size of the buffer in bytes.
    pub maximum_length: u16,

    /// Address of the character buffer.
    pub buffer: u32,
}

impl UnicodeString32 {
    /// Creates a descriptor for `length` bytes at `buffer`.
    ///
    /// The upper half of `buffer` is discarded.
    pub fn new(buffer: Va, length: u16) -> Self {
        Self {
            length,
            maximum_length: length.saturating_add(2),
            buffer: buffer.0 as u32,
        }
    }
}

/// A string descriptor widened to a common form, independent of the layout
/// it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteUnicodeString {
    /// Length of the string in bytes.
    pub length: u16,

    /// Address of the character buffer.
    pub buffer: Va,
}

impl From<UnicodeString64> for RemoteUnicodeString {
    fn from(value: UnicodeString64) -> Self {
        Self {
            length: value.length,
            buffer: Va(value.buffer),
        }
    }
}

impl From<UnicodeString32> for RemoteUnicodeString {
    fn from(value: UnicodeString32) -> Self {
        Self {
            length: value.length,
            buffer: Va::from(value.buffer),
        }
    }
}

impl RemoteUnicodeString {
    /// Copies the string out of the process into a destination that holds
    /// `capacity` UTF-16 units, one of which is reserved for the terminator.
    ///
    /// The copy is truncated to fit. A null buffer, a zero length or a
    /// failed read yields an empty string: this descriptor lives in memory
    /// the caller does not control.
    pub fn read_bounded<Driver>(
        &self,
        reader: &StealthyReader<Driver>,
        pid: ProcessId,
        capacity: usize,
    ) -> String
    where
        Driver: HvxDriver,
    {
        if capacity == 0 || self.buffer.is_null() || self.length == 0 {
            return String::new();
        }

        let max_bytes = (capacity - 1) * size_of::<u16>();
        let bytes = usize::from(self.length).min(max_bytes);
        if bytes < size_of::<u16>() {
            return String::new();
        }

        let mut buffer = vec![0u8; bytes];
        if let Err(err) = reader.read_process_memory(pid, self.buffer, &mut buffer) {
            tracing::debug!(%pid, va = %self.buffer, %err, "failed to read string buffer");
            return String::new();
        }

        let units = buffer
            .chunks_exact(size_of::<u16>())
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .take_while(|&unit| unit != 0)
            .collect::<Vec<_>>();

        String::from_utf16_lossy(&units)
    }
}
