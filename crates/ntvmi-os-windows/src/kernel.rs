use ntvmi_core::{Va, VmiCore, VmiDriver, os::Span};

use crate::pe;

/// Default maximum backward search distance for the kernel image base.
pub const DEFAULT_KERNEL_SEARCH_LIMIT: u64 = 32 * 1024 * 1024;

/// Locates the kernel image from the system call entry point.
///
/// Reads the virtual memory page by page backwards, starting at the page
/// containing `lstar` (`MSR_LSTAR`), until a page holding a valid PE header
/// is found. The first unreadable page ends the search, as does walking
/// more than `search_limit` bytes below `lstar`.
///
/// The returned image always starts before `lstar`: when `lstar` is page
/// aligned the search starts at the preceding page.
pub fn find_kernel<Driver>(vmi: &VmiCore<Driver>, lstar: Va, search_limit: u64) -> Option<Span>
where
    Driver: VmiDriver,
{
    let lowest = lstar.checked_sub(search_limit).unwrap_or_default();

    let mut base_address = lstar.page_base();
    if base_address == lstar {
        base_address = base_address.checked_sub(Va::PAGE_SIZE)?;
    }

    let mut data = vec![0u8; Va::PAGE_SIZE as usize];

    while base_address >= lowest {
        if let Err(err) = vmi.read(base_address, &mut data) {
            tracing::debug!(%base_address, %err, "kernel search hit an unreadable page");
            return None;
        }

        if let Some(size) = pe::image_size(&data) {
            tracing::debug!(%base_address, size, "found image header");
            return Some(Span::new(base_address, size));
        }

        base_address = base_address.checked_sub(Va::PAGE_SIZE)?;
    }

    tracing::warn!(
        %lstar,
        "No image header found within {} MB",
        search_limit / 1024 / 1024
    );

    None
}
