use std::ops::ControlFlow;

use ntvmi_core::{
    Pa, Register, Va, VmiCore, VmiDriver,
    os::{OsProcess, ProcessObject},
};

use crate::{WindowsError, WindowsOs, string};

/// Number of bytes of `_EPROCESS.ImageFileName` the kernel fills in.
///
/// The field is 15 bytes long, the last one is always a terminator.
const IMAGE_FILE_NAME_LENGTH: usize = 14;

impl<Driver> WindowsOs<Driver>
where
    Driver: VmiDriver,
{
    pub(crate) fn walk_processes(
        &self,
        vmi: &VmiCore<Driver>,
        visit: &mut impl FnMut(OsProcess) -> ControlFlow<()>,
    ) -> Result<(), WindowsError> {
        let PsActiveProcessHead = symbol!(self, PsActiveProcessHead);
        let ActiveProcessLinks = offset!(self, EPROCESS_ActiveProcessLinks);

        let entries = self.list_entries(vmi, PsActiveProcessHead, ActiveProcessLinks);
        for (index, entry) in entries.enumerate() {
            let object = match entry {
                Ok(entry) => ProcessObject(entry),
                Err(err) if index == 0 => return Err(err),
                Err(err) => {
                    // The guest may free a process while it is being walked.
                    tracing::warn!(%err, "process list ends early");
                    break;
                }
            };

            let translation_root = match self.process_translation_root(vmi, object) {
                Ok(translation_root) => translation_root,
                Err(err) => {
                    tracing::error!(%err, process = %object, "unable to read KPROCESS.DirectoryTableBase");
                    continue;
                }
            };

            let process = OsProcess {
                object,
                translation_root,
            };

            if visit(process).is_break() {
                break;
            }
        }

        Ok(())
    }

    /// Reads `_KPROCESS.DirectoryTableBase` of a process.
    pub fn process_translation_root(
        &self,
        vmi: &VmiCore<Driver>,
        process: ProcessObject,
    ) -> Result<Pa, WindowsError> {
        let Pcb = offset!(self, EPROCESS_Pcb);
        let DirectoryTableBase = offset!(self, KPROCESS_DirectoryTableBase);

        Ok(Pa(vmi.read_u64(process.0 + Pcb + DirectoryTableBase)?))
    }

    /// Returns the address of the `_KPCR` of the introspected vCPU.
    ///
    /// `MSR_GS_BASE` holds the `_KPCR` while the vCPU runs in kernel mode.
    /// In user mode the kernel value is parked in `MSR_KERNEL_GS_BASE`
    /// until the next `swapgs`.
    pub fn current_kpcr(&self, vmi: &VmiCore<Driver>) -> Result<Va, WindowsError> {
        let gs_base = Va(vmi.read_register(Register::MsrGsBase)?);
        if gs_base.is_kernel() {
            return Ok(gs_base);
        }

        Ok(Va(vmi.read_register(Register::MsrKernelGsBase)?))
    }

    pub(crate) fn find_current_process(
        &self,
        vmi: &VmiCore<Driver>,
    ) -> Result<OsProcess, WindowsError> {
        let Prcb = offset!(self, KPCR_Prcb);
        let CurrentThread = offset!(self, KPRCB_CurrentThread);
        let Process = offset!(self, KTHREAD_Process);
        let DirectoryTableBase = offset!(self, KPROCESS_DirectoryTableBase);
        let Pcb = offset!(self, EPROCESS_Pcb);

        let kpcr = self.current_kpcr(vmi)?;
        let thread = vmi.read_va(kpcr + Prcb + CurrentThread)?;
        let kprocess = vmi.read_va(thread + Process)?;
        let translation_root = Pa(vmi.read_u64(kprocess + DirectoryTableBase)?);

        Ok(OsProcess {
            object: ProcessObject(kprocess - Pcb),
            translation_root,
        })
    }

    pub(crate) fn find_system_process(
        &self,
        vmi: &VmiCore<Driver>,
    ) -> Result<OsProcess, WindowsError> {
        let PsInitialSystemProcess = symbol!(self, PsInitialSystemProcess);

        let object = vmi.read_va(PsInitialSystemProcess)?;
        if object.is_null() {
            return Err(WindowsError::CorruptedStruct("PsInitialSystemProcess"));
        }

        let object = ProcessObject(object);
        let translation_root = self.process_translation_root(vmi, object)?;

        Ok(OsProcess {
            object,
            translation_root,
        })
    }

    /// Reads the short image name stored in `_EPROCESS.ImageFileName`.
    ///
    /// The kernel keeps at most 14 characters; the returned flag is set
    /// when the name fills the whole field and thus may be truncated.
    pub fn process_short_name(
        &self,
        vmi: &VmiCore<Driver>,
        process: ProcessObject,
    ) -> Result<(String, bool), WindowsError> {
        let ImageFileName = offset!(self, EPROCESS_ImageFileName);

        let mut buffer = [0u8; IMAGE_FILE_NAME_LENGTH];
        vmi.read(process.0 + ImageFileName, &mut buffer)?;

        let length = buffer
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(IMAGE_FILE_NAME_LENGTH);

        let name = String::from_utf8_lossy(&buffer[..length]).into_owned();
        Ok((name, length == IMAGE_FILE_NAME_LENGTH))
    }

    /// Reads the full NT path of the process image.
    ///
    /// Follows `_EPROCESS.SeAuditProcessCreationInfo.ImageFileName`, which
    /// points to an `_OBJECT_NAME_INFORMATION`.
    pub fn process_image_file_name(
        &self,
        vmi: &VmiCore<Driver>,
        process: ProcessObject,
    ) -> Result<String, WindowsError> {
        let SeAuditProcessCreationInfo = offset!(self, EPROCESS_SeAuditProcessCreationInfo);
        let ImageFileName = offset!(self, SE_AUDIT_PROCESS_CREATION_INFO_ImageFileName);
        let Name = offset!(self, OBJECT_NAME_INFORMATION_Name);

        let name_info = vmi.read_va(process.0 + SeAuditProcessCreationInfo + ImageFileName)?;
        if name_info.is_null() {
            return Err(WindowsError::CorruptedStruct(
                "SE_AUDIT_PROCESS_CREATION_INFO.ImageFileName",
            ));
        }

        string::read_unicode_string(vmi, name_info + Name)
    }

    /// Reads the Win32 path of the process image from
    /// `_RTL_USER_PROCESS_PARAMETERS.ImagePathName`.
    ///
    /// Returns `Ok(None)` for processes without a PEB.
    pub fn process_image_path(
        &self,
        vmi: &VmiCore<Driver>,
        process: OsProcess,
    ) -> Result<Option<String>, WindowsError> {
        let ProcessParameters = offset!(self, PEB_ProcessParameters);
        let ImagePathName = offset!(self, RTL_USER_PROCESS_PARAMETERS_ImagePathName);

        let peb = self.process_peb(vmi, process.object)?;
        if peb.is_null() {
            return Ok(None);
        }

        let _guard = vmi.switch_address_space(process.translation_root)?;
        let parameters = vmi.read_va(peb + ProcessParameters)?;
        if parameters.is_null() {
            return Err(WindowsError::CorruptedStruct("PEB.ProcessParameters"));
        }

        string::read_unicode_string(vmi, parameters + ImagePathName).map(Some)
    }

    /// Reads `_EPROCESS.Peb`. The system process has none.
    pub fn process_peb(
        &self,
        vmi: &VmiCore<Driver>,
        process: ProcessObject,
    ) -> Result<Va, WindowsError> {
        let Peb = offset!(self, EPROCESS_Peb);
        Ok(vmi.read_va(process.0 + Peb)?)
    }

    pub(crate) fn image_name(&self, vmi: &VmiCore<Driver>, process: OsProcess) -> Option<String> {
        let (name, truncated) = match self.process_short_name(vmi, process.object) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(%err, process = %process.object, "unable to read EPROCESS.ImageFileName");
                return None;
            }
        };

        if !truncated && !name.is_empty() {
            return Some(name);
        }

        let path = match self.process_image_file_name(vmi, process.object) {
            Ok(path) => path,
            Err(err) => {
                tracing::debug!(%err, process = %process.object, %name, "keeping short image name");
                return (!name.is_empty()).then_some(name);
            }
        };

        match string::file_name(&path) {
            Some(file_name) => Some(file_name.to_owned()),
            None => (!name.is_empty()).then_some(name),
        }
    }
}
