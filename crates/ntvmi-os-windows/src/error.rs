use ntvmi_core::{Va, VmiError};

/// Error types for Windows operations.
#[derive(thiserror::Error, Debug)]
pub enum WindowsError {
    /// No kernel image header was found below the system call entry point.
    #[error("Unable to find kernel")]
    KernelNotFound,

    /// The kernel image declares a size above the configured limit.
    #[error("Kernel image too large ({0:#x})")]
    ImageTooLarge(u64),

    /// The located kernel image could not be read in full.
    #[error("Unable to read kernel module")]
    KernelImageRead(#[source] VmiError),

    /// The symbol store could not load debug information for the kernel.
    #[error("Unable to load symbols from kernel module")]
    SymbolIngestion(#[source] VmiError),

    /// One or more catalog entries could not be resolved.
    #[error("Unresolved symbols or members: {}", .0.join(", "))]
    UnresolvedEntries(Vec<String>),

    /// The loaded debug information does not describe the running kernel.
    #[error("Symbol mismatch (lstar: {lstar}, KiSystemCall64: {symbol})")]
    VersionMismatch {
        /// Value of `MSR_LSTAR`.
        lstar: Va,

        /// Resolved address of `KiSystemCall64`.
        symbol: Va,
    },

    /// Corrupted struct.
    #[error("Corrupted struct: {0}")]
    CorruptedStruct(&'static str),

    /// A backend operation failed.
    #[error(transparent)]
    Vmi(#[from] VmiError),
}

impl From<WindowsError> for VmiError {
    fn from(value: WindowsError) -> Self {
        match value {
            WindowsError::Vmi(err) => err,
            err => VmiError::Os(err.into()),
        }
    }
}
