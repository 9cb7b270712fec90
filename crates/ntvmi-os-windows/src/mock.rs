//! In-memory guest used by the unit tests.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
};

use ntvmi_core::{Pa, Register, Va, VmiDriver, VmiError, VmiSymbols, os::Span};

use crate::offsets::{KERNEL_MODULE, Member, Symbol};

///////////////////////////////////////////////////////////////////////////////
// Layout
///////////////////////////////////////////////////////////////////////////////

/// Member offsets of a Windows 10 x64 kernel.
pub const fn member_offset(member: Member) -> u64 {
    match member {
        Member::EPROCESS_ActiveProcessLinks => 0x448,
        Member::EPROCESS_ImageFileName => 0x5a8,
        Member::EPROCESS_Pcb => 0x0,
        Member::EPROCESS_Peb => 0x550,
        Member::EPROCESS_SeAuditProcessCreationInfo => 0x5c0,
        Member::EPROCESS_VadRoot => 0x7d8,
        Member::KPCR_Prcb => 0x180,
        Member::KPRCB_CurrentThread => 0x8,
        Member::KPROCESS_DirectoryTableBase => 0x28,
        Member::KTHREAD_Process => 0x220,
        Member::LDR_DATA_TABLE_ENTRY_DllBase => 0x30,
        Member::LDR_DATA_TABLE_ENTRY_FullDllName => 0x48,
        Member::LDR_DATA_TABLE_ENTRY_InLoadOrderLinks => 0x0,
        Member::LDR_DATA_TABLE_ENTRY_SizeOfImage => 0x40,
        Member::LIST_ENTRY_Flink => 0x0,
        Member::OBJECT_NAME_INFORMATION_Name => 0x0,
        Member::PEB_Ldr => 0x18,
        Member::PEB_LDR_DATA_InLoadOrderModuleList => 0x10,
        Member::PEB_ProcessParameters => 0x20,
        Member::RTL_USER_PROCESS_PARAMETERS_ImagePathName => 0x60,
        Member::SE_AUDIT_PROCESS_CREATION_INFO_ImageFileName => 0x0,
    }
}

/// Symbol RVAs relative to the kernel base.
pub const fn symbol_rva(symbol: Symbol) -> u64 {
    match symbol {
        Symbol::KiSystemCall64 => 0x1200,
        Symbol::PsActiveProcessHead => 0x3000,
        Symbol::PsInitialSystemProcess => 0x3010,
    }
}

///////////////////////////////////////////////////////////////////////////////
// Mock Driver
///////////////////////////////////////////////////////////////////////////////

type Pages = HashMap<u64, Vec<u8>>;

/// Guest memory split into kernel pages, visible from every address space,
/// and per-root user pages, visible only while that root is selected.
pub struct MockDriver {
    kernel: RefCell<Pages>,
    user: RefCell<HashMap<Pa, Pages>>,
    registers: RefCell<HashMap<Register, u64>>,
    root: Cell<Option<Pa>>,
    switches: Cell<usize>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            kernel: RefCell::new(HashMap::new()),
            user: RefCell::new(HashMap::new()),
            registers: RefCell::new(HashMap::new()),
            root: Cell::new(None),
            switches: Cell::new(0),
        }
    }

    pub fn set_register(&self, register: Register, value: u64) {
        self.registers.borrow_mut().insert(register, value);
    }

    /// Maps zeroed kernel pages covering `[address, address + size)`.
    pub fn map(&self, address: Va, size: u64) {
        let mut pages = self.kernel.borrow_mut();
        let mut page = address.page_base().0;
        while page < address.0 + size {
            pages.entry(page).or_insert_with(|| vec![0u8; Va::PAGE_SIZE as usize]);
            page += Va::PAGE_SIZE;
        }
    }

    /// Removes the kernel page containing `address`.
    pub fn unmap(&self, address: Va) {
        self.kernel.borrow_mut().remove(&address.page_base().0);
    }

    pub fn write(&self, address: Va, data: &[u8]) {
        Self::write_pages(&mut self.kernel.borrow_mut(), address, data);
    }

    pub fn write_u64(&self, address: Va, value: u64) {
        self.write(address, &value.to_le_bytes());
    }

    pub fn write_user(&self, root: Pa, address: Va, data: &[u8]) {
        let mut user = self.user.borrow_mut();
        Self::write_pages(user.entry(root).or_default(), address, data);
    }

    pub fn write_user_u64(&self, root: Pa, address: Va, value: u64) {
        self.write_user(root, address, &value.to_le_bytes());
    }

    /// Number of translation root changes performed so far.
    pub fn switches(&self) -> usize {
        self.switches.get()
    }

    fn write_pages(pages: &mut Pages, address: Va, data: &[u8]) {
        for (index, byte) in data.iter().enumerate() {
            let address = address.0 + index as u64;
            let page = pages
                .entry(address & Va::PAGE_MASK)
                .or_insert_with(|| vec![0u8; Va::PAGE_SIZE as usize]);
            page[(address & !Va::PAGE_MASK) as usize] = *byte;
        }
    }
}

impl VmiDriver for MockDriver {
    fn read(&self, address: Va, buffer: &mut [u8]) -> Result<(), VmiError> {
        let kernel = self.kernel.borrow();
        let user = self.user.borrow();
        let root = self.root.get();
        let user_pages = root.and_then(|root| user.get(&root));

        for (index, byte) in buffer.iter_mut().enumerate() {
            let address = address + index as u64;
            let page = address.page_base().0;

            let page = user_pages
                .and_then(|pages| pages.get(&page))
                .or_else(|| kernel.get(&page))
                .ok_or_else(|| VmiError::page_fault((address, root)))?;

            *byte = page[(address.0 & !Va::PAGE_MASK) as usize];
        }

        Ok(())
    }

    fn read_register(&self, register: Register) -> Result<u64, VmiError> {
        self.registers
            .borrow()
            .get(&register)
            .copied()
            .ok_or(VmiError::RegisterUnavailable(register))
    }

    fn translation_root(&self) -> Option<Pa> {
        self.root.get()
    }

    fn set_translation_root(&self, root: Option<Pa>) -> Result<(), VmiError> {
        self.switches.set(self.switches.get() + 1);
        self.root.set(root);
        Ok(())
    }
}

///////////////////////////////////////////////////////////////////////////////
// Mock Symbols
///////////////////////////////////////////////////////////////////////////////

/// Symbol store answering from fixed tables.
pub struct MockSymbols {
    symbols: HashMap<String, Va>,
    members: HashMap<(String, String), u64>,
    loaded: Option<(String, Span, usize)>,
    reject: bool,
}

impl MockSymbols {
    /// Creates a store that resolves the whole catalog for a kernel loaded
    /// at `kernel_base`.
    pub fn complete(kernel_base: Va) -> Self {
        let symbols = Symbol::ALL
            .iter()
            .map(|&symbol| (symbol.name().to_owned(), kernel_base + symbol_rva(symbol)))
            .collect();

        let members = Member::ALL
            .iter()
            .map(|&member| {
                (
                    (member.structure().to_owned(), member.name().to_owned()),
                    member_offset(member),
                )
            })
            .collect();

        Self {
            symbols,
            members,
            loaded: None,
            reject: false,
        }
    }

    /// Makes [`VmiSymbols::insert`] fail.
    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    pub fn set_symbol(&mut self, name: &str, address: Va) {
        self.symbols.insert(name.to_owned(), address);
    }

    pub fn remove_symbol(&mut self, name: &str) {
        self.symbols.remove(name);
    }

    pub fn remove_member(&mut self, structure: &str, member: &str) {
        self.members
            .remove(&(structure.to_owned(), member.to_owned()));
    }

    /// Module name, span and image length passed to the last successful
    /// [`VmiSymbols::insert`].
    pub fn loaded(&self) -> Option<&(String, Span, usize)> {
        self.loaded.as_ref()
    }
}

impl VmiSymbols for MockSymbols {
    fn insert(&mut self, module: &str, span: Span, image: &[u8]) -> Result<(), VmiError> {
        if self.reject {
            return Err(VmiError::Symbols(module.to_owned()));
        }

        self.loaded = Some((module.to_owned(), span, image.len()));
        Ok(())
    }

    fn symbol(&self, module: &str, name: &str) -> Option<Va> {
        if module != KERNEL_MODULE {
            return None;
        }

        self.symbols.get(name).copied()
    }

    fn member_offset(&self, module: &str, structure: &str, member: &str) -> Option<u64> {
        if module != KERNEL_MODULE {
            return None;
        }

        self.members
            .get(&(structure.to_owned(), member.to_owned()))
            .copied()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Images
///////////////////////////////////////////////////////////////////////////////

/// Builds the first page of a PE32+ image declaring `size_of_image`.
pub fn pe_header(size_of_image: u32) -> Vec<u8> {
    const NT_HEADERS_OFFSET: usize = 0x80;
    const OPTIONAL_HEADER_OFFSET: usize = NT_HEADERS_OFFSET + 4 + 20;

    let mut page = vec![0u8; Va::PAGE_SIZE as usize];

    // IMAGE_DOS_HEADER
    page[0..2].copy_from_slice(b"MZ");
    page[0x3c..0x40].copy_from_slice(&(NT_HEADERS_OFFSET as u32).to_le_bytes());

    // IMAGE_NT_HEADERS64.Signature
    page[NT_HEADERS_OFFSET..NT_HEADERS_OFFSET + 4].copy_from_slice(b"PE\0\0");

    // IMAGE_FILE_HEADER
    let file_header = NT_HEADERS_OFFSET + 4;
    page[file_header..file_header + 2].copy_from_slice(&0x8664u16.to_le_bytes());
    page[file_header + 16..file_header + 18].copy_from_slice(&0xf0u16.to_le_bytes());

    // IMAGE_OPTIONAL_HEADER64
    let optional = OPTIONAL_HEADER_OFFSET;
    page[optional..optional + 2].copy_from_slice(&0x20bu16.to_le_bytes());
    page[optional + 56..optional + 60].copy_from_slice(&size_of_image.to_le_bytes());

    page
}

/// Encodes `text` as little-endian UTF-16.
pub fn utf16(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Encodes a 64-bit `_UNICODE_STRING`.
pub fn unicode_string(length: u16, maximum_length: u16, buffer: Va) -> Vec<u8> {
    let mut result = Vec::with_capacity(16);
    result.extend_from_slice(&length.to_le_bytes());
    result.extend_from_slice(&maximum_length.to_le_bytes());
    result.extend_from_slice(&[0u8; 4]);
    result.extend_from_slice(&buffer.0.to_le_bytes());
    result
}
