use crate::{Pa, Register, Va};

/// An error that can occur when introspecting the guest.
#[derive(thiserror::Error, Debug)]
pub enum VmiError {
    /// An error occurred in the backend driver.
    #[error(transparent)]
    Driver(Box<dyn std::error::Error>),

    /// An OS-specific error occurred.
    #[error(transparent)]
    Os(Box<dyn std::error::Error>),

    /// A page fault occurred.
    #[error("Page not present ({:?}, len: {})", .0[0], .0.len())]
    PageFault(PageFaults),

    /// The register could not be read.
    #[error("Register {0:?} not available")]
    RegisterUnavailable(Register),

    /// The symbol store rejected the image.
    #[error("Unable to load symbols for module {0}")]
    Symbols(String),

    /// Operation not supported.
    #[error("Operation not supported.")]
    NotSupported,

    /// Other error.
    #[error("{0}")]
    Other(&'static str),
}

/// A page fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageFault {
    /// The virtual address that caused the page fault.
    pub address: Va,

    /// The root of the page table hierarchy, if one was selected.
    pub root: Option<Pa>,
}

/// A collection of page faults.
pub type PageFaults = smallvec::SmallVec<[PageFault; 1]>;

impl From<(Va, Option<Pa>)> for PageFault {
    fn from((address, root): (Va, Option<Pa>)) -> Self {
        Self { address, root }
    }
}

impl VmiError {
    /// Creates a new page fault error.
    pub fn page_fault(pf: impl Into<PageFault>) -> Self {
        Self::PageFault(smallvec::smallvec![pf.into()])
    }

    /// Checks whether the error is a page fault.
    pub fn is_page_fault(&self) -> bool {
        matches!(self, Self::PageFault(_))
    }
}
