/// Error types for Windows structure parsing.
#[derive(thiserror::Error, Debug)]
pub enum WindowsError {
    /// Corrupted struct.
    #[error("Corrupted struct: {0}")]
    CorruptedStruct(&'static str),

    /// The DOS header is missing or malformed.
    #[error("Invalid DOS header")]
    InvalidDosHeader,

    /// The NT headers are missing or malformed.
    #[error("Invalid NT headers")]
    InvalidNtHeaders,

    /// The image has no export directory.
    #[error("Image has no export directory")]
    MissingExportDirectory,

    /// The export directory could not be parsed.
    #[error("Invalid export table")]
    InvalidExportTable,
}

impl From<WindowsError> for hvx_core::HvxError {
    fn from(value: WindowsError) -> Self {
        hvx_core::HvxError::Os(value.into())
    }
}
