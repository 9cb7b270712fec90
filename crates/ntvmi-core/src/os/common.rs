use serde::{Deserialize, Serialize};

use crate::{Pa, Va};

/// A process object within a system.
///
/// Equivalent to `EPROCESS*` on Windows. This is the address of the kernel
/// object, not a numeric process ID.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProcessObject(pub Va);

impl ProcessObject {
    /// Checks if the process object is a null reference.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Converts the process object to a 64-bit unsigned integer.
    pub fn to_u64(&self) -> u64 {
        self.0.0
    }
}

impl From<Va> for ProcessObject {
    fn from(va: Va) -> Self {
        Self(va)
    }
}

impl From<ProcessObject> for Va {
    fn from(value: ProcessObject) -> Self {
        value.0
    }
}

impl std::fmt::Display for ProcessObject {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> ::std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A process handle.
///
/// Pairs the process object with the translation root needed to read its
/// user address space. Handles become stale when the guest frees the
/// object; reads through a stale handle fail instead of panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OsProcess {
    /// The process object.
    pub object: ProcessObject,

    /// The root of the process page table hierarchy (DTB).
    pub translation_root: Pa,
}

/// A loaded module within a process.
///
/// Equivalent to `LDR_DATA_TABLE_ENTRY*` on Windows. Only meaningful in the
/// address space of the process that produced it.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ModuleObject(pub Va);

impl From<Va> for ModuleObject {
    fn from(va: Va) -> Self {
        Self(va)
    }
}

impl From<ModuleObject> for Va {
    fn from(value: ModuleObject) -> Self {
        value.0
    }
}

impl std::fmt::Display for ModuleObject {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> ::std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A contiguous range of guest virtual addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// First address of the range.
    pub address: Va,

    /// Size of the range in bytes.
    pub size: u64,
}

impl Span {
    /// Creates a new span.
    pub fn new(address: Va, size: u64) -> Self {
        Self { address, size }
    }

    /// Returns the first address past the end of the span.
    pub fn end(&self) -> Va {
        self.address + self.size
    }

    /// Checks whether `address` falls inside the span.
    pub fn contains(&self, address: Va) -> bool {
        self.address <= address && address < self.end()
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> ::std::fmt::Result {
        write!(f, "{} - {} ({:#x})", self.address, self.end(), self.size)
    }
}
