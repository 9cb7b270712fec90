use crate::{Pa, Va, VmiError, os::Span};

/// CPU registers the introspection layer needs from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// `MSR_LSTAR`, the 64-bit system call entry point.
    MsrLstar,

    /// `MSR_GS_BASE`, the active `GS` segment base.
    MsrGsBase,

    /// `MSR_KERNEL_GS_BASE`, the value `swapgs` exchanges with `GS` base.
    MsrKernelGsBase,
}

/// A trait for implementing a guest memory and register backend.
///
/// All reads are synchronous. Virtual addresses are translated through the
/// currently selected translation root, see [`translation_root`].
///
/// [`translation_root`]: Self::translation_root
pub trait VmiDriver {
    /// Reads guest virtual memory into `buffer`.
    ///
    /// The read either fills the whole buffer or fails.
    fn read(&self, address: Va, buffer: &mut [u8]) -> Result<(), VmiError>;

    /// Reads a CPU register of the introspected vCPU.
    fn read_register(&self, register: Register) -> Result<u64, VmiError>;

    /// Returns the translation root currently used for virtual reads.
    ///
    /// `None` means the live root of the introspected vCPU.
    fn translation_root(&self) -> Option<Pa>;

    /// Selects the translation root used for subsequent virtual reads.
    fn set_translation_root(&self, root: Option<Pa>) -> Result<(), VmiError>;
}

/// A trait for implementing a debug symbol store.
///
/// The store extracts debug information from a loaded image and answers
/// symbol and structure layout queries against it.
pub trait VmiSymbols {
    /// Loads debug information for `module` from its in-memory image.
    ///
    /// `span` is the address range the image is loaded at; resolved symbols
    /// are absolute addresses within it.
    fn insert(&mut self, module: &str, span: Span, image: &[u8]) -> Result<(), VmiError>;

    /// Resolves the absolute address of a symbol.
    fn symbol(&self, module: &str, name: &str) -> Option<Va>;

    /// Resolves the byte offset of a structure member.
    fn member_offset(&self, module: &str, structure: &str, member: &str) -> Option<u64>;
}
