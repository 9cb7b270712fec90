//! Operating system abstraction.
//!
//! An OS implementation turns raw guest memory into processes and modules.
//! Every query is best-effort: failures are logged and surface as `None`
//! (or `false` for enumerations), never as panics.

mod common;

use std::ops::ControlFlow;

pub use self::common::{ModuleObject, OsProcess, ProcessObject, Span};
use crate::{VmiCore, VmiDriver};

/// Operating system trait.
pub trait VmiOs<Driver>
where
    Driver: VmiDriver,
{
    /// Returns the address range of the kernel image.
    fn kernel_image(&self) -> Span;

    /// Walks the list of processes.
    ///
    /// The visitor may return [`ControlFlow::Break`] to stop the walk early.
    /// Returns `false` if the walk could not start. Processes that cannot be
    /// turned into a handle are skipped, and a broken link ends the walk
    /// with the processes visited so far.
    ///
    /// # Platform-specific
    ///
    /// - **Windows**: `PsActiveProcessHead` / `_EPROCESS.ActiveProcessLinks`.
    fn list_processes(
        &self,
        vmi: &VmiCore<Driver>,
        visit: impl FnMut(OsProcess) -> ControlFlow<()>,
    ) -> bool;

    /// Retrieves the process running on the introspected vCPU.
    fn current_process(&self, vmi: &VmiCore<Driver>) -> Option<OsProcess>;

    /// Retrieves the system process.
    ///
    /// # Platform-specific
    ///
    /// - **Windows**: `PsInitialSystemProcess`.
    fn system_process(&self, vmi: &VmiCore<Driver>) -> Option<OsProcess>;

    /// Finds the first process whose name equals `name` (case-sensitive).
    fn find_process(&self, vmi: &VmiCore<Driver>, name: &str) -> Option<OsProcess> {
        let mut result = None;
        self.list_processes(vmi, |process| {
            if self.process_name(vmi, process).as_deref() != Some(name) {
                return ControlFlow::Continue(());
            }

            result = Some(process);
            ControlFlow::Break(())
        });
        result
    }

    /// Retrieves the image name of a process.
    fn process_name(&self, vmi: &VmiCore<Driver>, process: OsProcess) -> Option<String>;

    /// Walks the user-mode modules loaded in a process.
    ///
    /// Returns `true` without visiting anything for processes without a
    /// user address space, and `false` if the walk could not start. A broken
    /// link ends the walk with the modules visited so far.
    fn list_modules(
        &self,
        vmi: &VmiCore<Driver>,
        process: OsProcess,
        visit: impl FnMut(ModuleObject) -> ControlFlow<()>,
    ) -> bool;

    /// Retrieves the full path of a module.
    fn module_name(
        &self,
        vmi: &VmiCore<Driver>,
        process: OsProcess,
        module: ModuleObject,
    ) -> Option<String>;

    /// Retrieves the address range a module is loaded at.
    fn module_span(
        &self,
        vmi: &VmiCore<Driver>,
        process: OsProcess,
        module: ModuleObject,
    ) -> Option<Span>;

    /// Checks whether the process owns a user virtual address space.
    fn has_virtual_memory(&self, vmi: &VmiCore<Driver>, process: OsProcess) -> bool;

    /// Collects all processes into a vector.
    ///
    /// Returns `None` only if the walk could not start; see
    /// [`list_processes`](Self::list_processes).
    fn processes(&self, vmi: &VmiCore<Driver>) -> Option<Vec<OsProcess>> {
        let mut result = Vec::new();
        let complete = self.list_processes(vmi, |process| {
            result.push(process);
            ControlFlow::Continue(())
        });

        complete.then_some(result)
    }

    /// Collects all modules of a process into a vector.
    ///
    /// Returns `None` only if the walk could not start; see
    /// [`list_modules`](Self::list_modules).
    fn modules(&self, vmi: &VmiCore<Driver>, process: OsProcess) -> Option<Vec<ModuleObject>> {
        let mut result = Vec::new();
        let complete = self.list_modules(vmi, process, |module| {
            result.push(module);
            ControlFlow::Continue(())
        });

        complete.then_some(result)
    }
}
