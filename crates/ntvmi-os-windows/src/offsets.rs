//! Symbol and structure member catalog.
//!
//! The catalog is closed: every entry must resolve against the kernel's
//! debug information before a [`WindowsOs`] can be created. Resolved values
//! live in plain arrays indexed by the catalog enums.
//!
//! [`WindowsOs`]: crate::WindowsOs

use std::ops::Index;

use ntvmi_core::{Va, VmiSymbols};

use crate::WindowsError;

/// Module name the kernel image is registered under in the symbol store.
pub const KERNEL_MODULE: &str = "nt";

macro_rules! symbols {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($symbol:ident,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(usize)]
        pub enum $name {
            $(
                #[doc = concat!("`nt!", stringify!($symbol), "`")]
                $symbol,
            )*
        }

        impl $name {
            /// All catalog entries, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$symbol),*];

            /// Number of catalog entries.
            pub const COUNT: usize = Self::ALL.len();

            /// Name of the symbol.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$symbol => stringify!($symbol),)*
                }
            }
        }
    };
}

macro_rules! members {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($member:ident => $structure:ident . $field:ident,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(usize)]
        pub enum $name {
            $(
                #[doc = concat!("`nt!", stringify!($structure), ".", stringify!($field), "`")]
                $member,
            )*
        }

        impl $name {
            /// All catalog entries, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$member),*];

            /// Number of catalog entries.
            pub const COUNT: usize = Self::ALL.len();

            /// Name of the structure containing the member.
            pub const fn structure(self) -> &'static str {
                match self {
                    $(Self::$member => stringify!($structure),)*
                }
            }

            /// Name of the member.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$member => stringify!($field),)*
                }
            }
        }
    };
}

symbols! {
    /// Kernel symbols used by the [`WindowsOs`] implementation.
    ///
    /// [`WindowsOs`]: crate::WindowsOs
    pub enum Symbol {
        KiSystemCall64,
        PsActiveProcessHead,
        PsInitialSystemProcess,
    }
}

members! {
    /// Kernel structure members used by the [`WindowsOs`] implementation.
    ///
    /// [`WindowsOs`]: crate::WindowsOs
    #[allow(non_camel_case_types)]
    pub enum Member {
        EPROCESS_ActiveProcessLinks                  => _EPROCESS.ActiveProcessLinks,
        EPROCESS_ImageFileName                       => _EPROCESS.ImageFileName,
        EPROCESS_Pcb                                 => _EPROCESS.Pcb,
        EPROCESS_Peb                                 => _EPROCESS.Peb,
        EPROCESS_SeAuditProcessCreationInfo          => _EPROCESS.SeAuditProcessCreationInfo,
        EPROCESS_VadRoot                             => _EPROCESS.VadRoot,
        KPCR_Prcb                                    => _KPCR.Prcb,
        KPRCB_CurrentThread                          => _KPRCB.CurrentThread,
        KPROCESS_DirectoryTableBase                  => _KPROCESS.DirectoryTableBase,
        KTHREAD_Process                              => _KTHREAD.Process,
        LDR_DATA_TABLE_ENTRY_DllBase                 => _LDR_DATA_TABLE_ENTRY.DllBase,
        LDR_DATA_TABLE_ENTRY_FullDllName             => _LDR_DATA_TABLE_ENTRY.FullDllName,
        LDR_DATA_TABLE_ENTRY_InLoadOrderLinks        => _LDR_DATA_TABLE_ENTRY.InLoadOrderLinks,
        LDR_DATA_TABLE_ENTRY_SizeOfImage             => _LDR_DATA_TABLE_ENTRY.SizeOfImage,
        LIST_ENTRY_Flink                             => _LIST_ENTRY.Flink,
        OBJECT_NAME_INFORMATION_Name                 => _OBJECT_NAME_INFORMATION.Name,
        PEB_Ldr                                      => _PEB.Ldr,
        PEB_LDR_DATA_InLoadOrderModuleList           => _PEB_LDR_DATA.InLoadOrderModuleList,
        PEB_ProcessParameters                        => _PEB.ProcessParameters,
        RTL_USER_PROCESS_PARAMETERS_ImagePathName    => _RTL_USER_PROCESS_PARAMETERS.ImagePathName,
        SE_AUDIT_PROCESS_CREATION_INFO_ImageFileName => _SE_AUDIT_PROCESS_CREATION_INFO.ImageFileName,
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}!{}", KERNEL_MODULE, self.name())
    }
}

impl std::fmt::Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}!{}.{}", KERNEL_MODULE, self.structure(), self.name())
    }
}

/// Resolved symbol addresses, indexed by [`Symbol`].
#[derive(Debug, Clone)]
pub struct Symbols([Va; Symbol::COUNT]);

impl Index<Symbol> for Symbols {
    type Output = Va;

    fn index(&self, symbol: Symbol) -> &Self::Output {
        &self.0[symbol as usize]
    }
}

/// Resolved member offsets, indexed by [`Member`].
#[derive(Debug, Clone)]
pub struct Offsets([u64; Member::COUNT]);

impl Index<Member> for Offsets {
    type Output = u64;

    fn index(&self, member: Member) -> &Self::Output {
        &self.0[member as usize]
    }
}

/// Fully resolved catalog.
///
/// Only constructed when every entry resolved; never partially filled.
#[derive(Debug, Clone)]
pub struct OffsetTable {
    /// Symbol addresses.
    pub symbols: Symbols,

    /// Member offsets.
    pub offsets: Offsets,
}

impl OffsetTable {
    /// Resolves every catalog entry against the symbol store.
    ///
    /// Resolution does not stop at the first miss; every unresolved entry is
    /// logged and reported in [`WindowsError::UnresolvedEntries`].
    pub fn resolve(store: &impl VmiSymbols) -> Result<Self, WindowsError> {
        let mut missing = Vec::new();

        let mut symbols = [Va(0); Symbol::COUNT];
        for &symbol in Symbol::ALL {
            match store.symbol(KERNEL_MODULE, symbol.name()) {
                Some(address) => symbols[symbol as usize] = address,
                None => {
                    tracing::error!(%symbol, "unable to read symbol offset");
                    missing.push(symbol.to_string());
                }
            }
        }

        let mut offsets = [0u64; Member::COUNT];
        for &member in Member::ALL {
            match store.member_offset(KERNEL_MODULE, member.structure(), member.name()) {
                Some(offset) => offsets[member as usize] = offset,
                None => {
                    tracing::error!(%member, "unable to read member offset");
                    missing.push(member.to_string());
                }
            }
        }

        if !missing.is_empty() {
            return Err(WindowsError::UnresolvedEntries(missing));
        }

        Ok(Self {
            symbols: Symbols(symbols),
            offsets: Offsets(offsets),
        })
    }
}
