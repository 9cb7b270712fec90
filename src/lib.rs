//! Process and module introspection for Windows NT guests.
//!
//! This crate bundles [`ntvmi_core`], which defines the backend contract
//! ([`VmiDriver`], [`VmiSymbols`]) and the OS-facing [`VmiOs`] trait, with
//! the Windows implementation of that trait.
//!
//! The hypervisor or dump backend is supplied by the caller: implement
//! [`VmiDriver`] for guest memory and registers, and [`VmiSymbols`] for a
//! debug-information store that can load the kernel image.
//!
//! ## Features
//!
//! - `os-windows` (default): the [`os::windows`] module.

pub use ntvmi_core::*;

/// Operating system implementations.
pub mod os {
    pub use ntvmi_core::os::*;

    #[cfg(feature = "os-windows")]
    pub use ntvmi_os_windows as windows;
}
