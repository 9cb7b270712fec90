//! # Windows OS-specific introspection
//!
//! This crate reconstructs processes and modules of a running 64-bit
//! Windows guest from raw memory, working in conjunction with the
//! `ntvmi-core` crate.
//!
//! No symbol file has to be prepared in advance: [`WindowsOs::new`] locates
//! the kernel image from `MSR_LSTAR`, hands the image to the symbol store
//! and resolves a fixed catalog of symbols and structure offsets. The
//! resolved table is then used for every query.
//!
//! ## Example
//!
//! ```no_run
//! # use ntvmi_core::{VmiCore, VmiDriver, VmiOs, VmiSymbols};
//! # use ntvmi_os_windows::WindowsOs;
//! #
//! # fn example<Driver: VmiDriver>(
//! #     vmi: &VmiCore<Driver>,
//! #     symbols: &mut impl VmiSymbols,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let os = WindowsOs::new(vmi, symbols)?;
//!
//! for process in os.processes(vmi).unwrap_or_default() {
//!     let name = os.process_name(vmi, process).unwrap_or_default();
//!     println!("{} {} {}", process.object, process.translation_root, name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The guest keeps running while it is introspected, so two reads may
//! observe different states. Handles can go stale at any time; every query
//! tolerates that and reports `None` instead of failing hard.

// Allow Windows-specific naming conventions to be used throughout this module.
#![allow(
    non_snake_case, // example: PsActiveProcessHead
)]

use std::{marker::PhantomData, ops::ControlFlow};

use ntvmi_core::{
    Register, Va, VmiCore, VmiDriver, VmiOs, VmiSymbols,
    os::{ModuleObject, OsProcess, Span},
};
use serde::{Deserialize, Serialize};

macro_rules! offset {
    ($os:expr, $member:ident) => {
        $os.table.offsets[$crate::offsets::Member::$member]
    };
}

macro_rules! symbol {
    ($os:expr, $symbol:ident) => {
        $os.table.symbols[$crate::offsets::Symbol::$symbol]
    };
}

mod error;
pub use self::error::WindowsError;

mod iter;
pub use self::iter::ListEntryIterator;

mod kernel;
pub use self::kernel::{DEFAULT_KERNEL_SEARCH_LIMIT, find_kernel};

pub mod offsets;
use self::offsets::{KERNEL_MODULE, OffsetTable, Offsets, Symbol, Symbols};

pub mod pe;

mod string;
pub use self::string::{decode_utf16, file_name, read_unicode_string};

mod module;
mod process;

#[cfg(test)]
mod mock;

/// Tunables for [`WindowsOs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowsOsOptions {
    /// Maximum distance, in bytes, the kernel search walks below
    /// `MSR_LSTAR`.
    pub kernel_search_limit: u64,

    /// Largest kernel image, in bytes, that is read for symbol loading.
    pub max_kernel_image_size: u64,

    /// Maximum number of entries visited in a single list walk.
    pub max_list_entries: usize,
}

impl Default for WindowsOsOptions {
    fn default() -> Self {
        Self {
            kernel_search_limit: DEFAULT_KERNEL_SEARCH_LIMIT,
            max_kernel_image_size: 256 * 1024 * 1024,
            max_list_entries: 0x10000,
        }
    }
}

/// VMI operations for the Windows operating system.
///
/// `WindowsOs` holds the resolved symbol and offset table of the running
/// kernel. It can only be created through the bootstrap in [`new`], which
/// fails unless every catalog entry resolved and the debug information
/// matches the running kernel.
///
/// [`new`]: Self::new
pub struct WindowsOs<Driver>
where
    Driver: VmiDriver,
{
    table: OffsetTable,
    kernel_image: Span,
    options: WindowsOsOptions,

    _marker: PhantomData<Driver>,
}

impl<Driver> WindowsOs<Driver>
where
    Driver: VmiDriver,
{
    /// Creates a new `WindowsOs` instance with default options.
    pub fn new(vmi: &VmiCore<Driver>, symbols: &mut impl VmiSymbols) -> Result<Self, WindowsError> {
        Self::with_options(vmi, symbols, WindowsOsOptions::default())
    }

    /// Creates a new `WindowsOs` instance.
    ///
    /// 1. Reads `MSR_LSTAR`, which points at `KiSystemCall64`.
    /// 2. Locates the kernel image below it, see [`find_kernel`].
    /// 3. Reads the whole image and loads it into `symbols` as module `nt`.
    /// 4. Resolves the symbol and member catalog.
    /// 5. Verifies that the resolved `KiSystemCall64` equals `MSR_LSTAR`.
    pub fn with_options(
        vmi: &VmiCore<Driver>,
        symbols: &mut impl VmiSymbols,
        options: WindowsOsOptions,
    ) -> Result<Self, WindowsError> {
        let lstar = Va(vmi.read_register(Register::MsrLstar)?);

        let kernel_image = match find_kernel(vmi, lstar, options.kernel_search_limit) {
            Some(kernel_image) => kernel_image,
            None => {
                tracing::error!(%lstar, "unable to find kernel");
                return Err(WindowsError::KernelNotFound);
            }
        };

        tracing::info!(
            start = %kernel_image.address,
            end = %kernel_image.end(),
            size = kernel_image.size,
            "kernel"
        );

        if kernel_image.size > options.max_kernel_image_size {
            tracing::error!(size = kernel_image.size, "kernel image too large");
            return Err(WindowsError::ImageTooLarge(kernel_image.size));
        }

        let mut image = vec![0u8; kernel_image.size as usize];
        if let Err(err) = vmi.read(kernel_image.address, &mut image) {
            tracing::error!(%err, "unable to read kernel module");
            return Err(WindowsError::KernelImageRead(err));
        }

        if let Err(err) = symbols.insert(KERNEL_MODULE, kernel_image, &image) {
            tracing::error!(%err, "unable to load symbols from kernel module");
            return Err(WindowsError::SymbolIngestion(err));
        }

        let table = OffsetTable::resolve(&*symbols)?;

        let KiSystemCall64 = table.symbols[Symbol::KiSystemCall64];
        if KiSystemCall64 != lstar {
            tracing::error!(%lstar, pdb = %KiSystemCall64, "PDB mismatch");
            return Err(WindowsError::VersionMismatch {
                lstar,
                symbol: KiSystemCall64,
            });
        }

        Ok(Self {
            table,
            kernel_image,
            options,
            _marker: PhantomData,
        })
    }

    /// Returns the resolved member offsets.
    pub fn offsets(&self) -> &Offsets {
        &self.table.offsets
    }

    /// Returns the resolved symbol addresses.
    pub fn symbols(&self) -> &Symbols {
        &self.table.symbols
    }

    /// Returns the options this instance was created with.
    pub fn options(&self) -> &WindowsOsOptions {
        &self.options
    }

    /// Creates an iterator over a `LIST_ENTRY` chain, yielding the
    /// addresses of the containing records.
    fn list_entries<'a>(
        &self,
        vmi: &'a VmiCore<Driver>,
        list_head: Va,
        offset: u64,
    ) -> ListEntryIterator<'a, Driver> {
        ListEntryIterator::new(
            vmi,
            list_head,
            offset,
            offset!(self, LIST_ENTRY_Flink),
            self.options.max_list_entries,
        )
    }
}

impl<Driver> VmiOs<Driver> for WindowsOs<Driver>
where
    Driver: VmiDriver,
{
    fn kernel_image(&self) -> Span {
        self.kernel_image
    }

    fn list_processes(
        &self,
        vmi: &VmiCore<Driver>,
        mut visit: impl FnMut(OsProcess) -> ControlFlow<()>,
    ) -> bool {
        match self.walk_processes(vmi, &mut visit) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "unable to walk process list");
                false
            }
        }
    }

    fn current_process(&self, vmi: &VmiCore<Driver>) -> Option<OsProcess> {
        self.find_current_process(vmi)
            .inspect_err(|err| tracing::error!(%err, "unable to read current process"))
            .ok()
    }

    fn system_process(&self, vmi: &VmiCore<Driver>) -> Option<OsProcess> {
        self.find_system_process(vmi)
            .inspect_err(|err| tracing::error!(%err, "unable to read PsInitialSystemProcess"))
            .ok()
    }

    fn process_name(&self, vmi: &VmiCore<Driver>, process: OsProcess) -> Option<String> {
        self.image_name(vmi, process)
    }

    fn list_modules(
        &self,
        vmi: &VmiCore<Driver>,
        process: OsProcess,
        mut visit: impl FnMut(ModuleObject) -> ControlFlow<()>,
    ) -> bool {
        match self.walk_modules(vmi, process, &mut visit) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, process = %process.object, "unable to walk module list");
                false
            }
        }
    }

    fn module_name(
        &self,
        vmi: &VmiCore<Driver>,
        process: OsProcess,
        module: ModuleObject,
    ) -> Option<String> {
        self.read_module_name(vmi, process, module)
            .inspect_err(|err| tracing::warn!(%err, %module, "unable to read module name"))
            .ok()
    }

    fn module_span(
        &self,
        vmi: &VmiCore<Driver>,
        process: OsProcess,
        module: ModuleObject,
    ) -> Option<Span> {
        self.read_module_span(vmi, process, module)
            .inspect_err(|err| tracing::warn!(%err, %module, "unable to read module span"))
            .ok()
    }

    fn has_virtual_memory(&self, vmi: &VmiCore<Driver>, process: OsProcess) -> bool {
        let VadRoot = offset!(self, EPROCESS_VadRoot);

        match vmi.read_va(process.object.0 + VadRoot) {
            Ok(root) => !root.is_null(),
            Err(err) => {
                tracing::debug!(%err, process = %process.object, "unable to read EPROCESS.VadRoot");
                false
            }
        }
    }
}
