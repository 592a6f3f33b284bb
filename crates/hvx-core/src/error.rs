use crate::Va;

/// An error that can occur while introspecting a guest.
#[derive(thiserror::Error, Debug)]
pub enum HvxError {
    /// A collaborator (driver) error occurred.
    #[error(transparent)]
    Driver(Box<dyn std::error::Error + Send + Sync>),

    /// An OS-specific error occurred.
    #[error(transparent)]
    Os(Box<dyn std::error::Error + Send + Sync>),

    /// Bad process identifier, empty buffer or empty name.
    #[error("Invalid parameter")]
    InvalidParameter,

    /// The virtual address could not be translated.
    #[error("Invalid address ({0})")]
    InvalidAddress(Va),

    /// A physical read or a required intermediate read failed.
    #[error("Operation was unsuccessful")]
    Unsuccessful,

    /// The process or module was not found.
    #[error("Not found")]
    NotFound,

    /// Transparent mode is already enabled.
    #[error("Debugger is already hidden")]
    AlreadyHidden,

    /// Transparent mode is already disabled.
    #[error("Debugger is already unhidden")]
    AlreadyUnhidden,

    /// The syscall-interception subsystem could not be set up, or the
    /// resolved syscall coverage was rejected.
    #[error("Unable to hide or unhide the debugger")]
    UnableToHideOrUnhideDebugger,
}

impl HvxError {
    /// Boxes a collaborator error.
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Driver(Box::new(err))
    }
}
