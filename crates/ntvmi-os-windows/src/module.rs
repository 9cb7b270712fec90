use std::ops::ControlFlow;

use ntvmi_core::{
    VmiCore, VmiDriver,
    os::{ModuleObject, OsProcess, Span},
};

use crate::{WindowsError, WindowsOs, string};

impl<Driver> WindowsOs<Driver>
where
    Driver: VmiDriver,
{
    pub(crate) fn walk_modules(
        &self,
        vmi: &VmiCore<Driver>,
        process: OsProcess,
        visit: &mut impl FnMut(ModuleObject) -> ControlFlow<()>,
    ) -> Result<(), WindowsError> {
        let Ldr = offset!(self, PEB_Ldr);
        let InLoadOrderModuleList = offset!(self, PEB_LDR_DATA_InLoadOrderModuleList);
        let InLoadOrderLinks = offset!(self, LDR_DATA_TABLE_ENTRY_InLoadOrderLinks);

        let peb = self.process_peb(vmi, process.object)?;
        if peb.is_null() {
            tracing::trace!(process = %process.object, "no PEB");
            return Ok(());
        }

        let _guard = vmi.switch_address_space(process.translation_root)?;

        // The loader data is allocated after the PEB, early in process
        // creation.
        let ldr = vmi.read_va(peb + Ldr)?;
        if ldr.is_null() {
            tracing::trace!(process = %process.object, "no PEB.Ldr");
            return Ok(());
        }

        let list_head = ldr + InLoadOrderModuleList;
        let entries = self.list_entries(vmi, list_head, InLoadOrderLinks);
        for (index, entry) in entries.enumerate() {
            let module = match entry {
                Ok(entry) => ModuleObject(entry),
                Err(err) if index == 0 => return Err(err),
                Err(err) => {
                    tracing::warn!(%err, process = %process.object, "module list ends early");
                    break;
                }
            };

            if visit(module).is_break() {
                break;
            }
        }

        Ok(())
    }

    pub(crate) fn read_module_span(
        &self,
        vmi: &VmiCore<Driver>,
        process: OsProcess,
        module: ModuleObject,
    ) -> Result<Span, WindowsError> {
        let DllBase = offset!(self, LDR_DATA_TABLE_ENTRY_DllBase);
        let SizeOfImage = offset!(self, LDR_DATA_TABLE_ENTRY_SizeOfImage);

        let _guard = vmi.switch_address_space(process.translation_root)?;
        let base = vmi.read_va(module.0 + DllBase)?;
        let size = vmi.read_u32(module.0 + SizeOfImage)?;

        Ok(Span::new(base, u64::from(size)))
    }

    pub(crate) fn read_module_name(
        &self,
        vmi: &VmiCore<Driver>,
        process: OsProcess,
        module: ModuleObject,
    ) -> Result<String, WindowsError> {
        let FullDllName = offset!(self, LDR_DATA_TABLE_ENTRY_FullDllName);

        let _guard = vmi.switch_address_space(process.translation_root)?;
        string::read_unicode_string(vmi, module.0 + FullDllName)
    }
}
