//! Image header probing.

use object::{
    endian::LittleEndian as LE,
    pe::{IMAGE_DOS_SIGNATURE, IMAGE_NT_SIGNATURE, ImageDosHeader, ImageNtHeaders64},
    read::{
        ReadRef as _,
        pe::{ImageNtHeaders, ImageOptionalHeader},
    },
};

/// Checks whether `data` starts with a loaded PE32+ image header and
/// returns the image size it declares (`SizeOfImage`).
///
/// The headers must lie entirely within `data`.
pub fn image_size(data: &[u8]) -> Option<u64> {
    let dos_header = data.read_at::<ImageDosHeader>(0).ok()?;
    if dos_header.e_magic.get(LE) != IMAGE_DOS_SIGNATURE {
        return None;
    }

    let mut offset = dos_header.nt_headers_offset() as u64;
    let nt_headers = data.read::<ImageNtHeaders64>(&mut offset).ok()?;

    if nt_headers.signature() != IMAGE_NT_SIGNATURE {
        tracing::trace!("MZ without PE signature");
        return None;
    }

    if !nt_headers.is_valid_optional_magic() {
        tracing::trace!("not a PE32+ image");
        return None;
    }

    match nt_headers.optional_header().size_of_image() {
        0 => None,
        size => Some(size as u64),
    }
}
