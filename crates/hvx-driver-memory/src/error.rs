use hvx_core::{HvxError, Pa, ProcessId};

/// Error types for the in-memory driver.
#[derive(thiserror::Error, Debug)]
pub enum MemoryDriverError {
    /// No frame backs the physical address.
    #[error("Frame not present ({0})")]
    FrameNotPresent(Pa),

    /// The frame does not allow the requested access.
    #[error("Access denied ({0})")]
    AccessDenied(Pa),

    /// The access runs past the end of the frame.
    #[error("Access crosses frame boundary ({0}, len: {1})")]
    CrossesFrame(Pa, usize),

    /// The process does not exist.
    #[error("Process not found ({0})")]
    ProcessNotFound(ProcessId),
}

impl From<MemoryDriverError> for HvxError {
    fn from(value: MemoryDriverError) -> Self {
        HvxError::driver(value)
    }
}
