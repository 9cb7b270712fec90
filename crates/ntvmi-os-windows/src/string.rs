//! `_UNICODE_STRING` reading and UTF-16 decoding.

use ntvmi_core::{Va, VmiCore, VmiDriver};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::WindowsError;

/// A 64-bit `_UNICODE_STRING`.
#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct UnicodeString64 {
    length: u16,
    maximum_length: u16,
    _padding: u32,
    buffer: u64,
}

/// Decodes little-endian UTF-16 bytes.
///
/// Returns `None` for an odd number of bytes or unpaired surrogates.
pub fn decode_utf16(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    let units = bytes
        .chunks_exact(2)
        .map(|unit| u16::from_le_bytes([unit[0], unit[1]]));

    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

/// Reads the string described by the `_UNICODE_STRING` at `va`.
///
/// The descriptor is rejected when `Length` exceeds `MaximumLength`; the
/// buffer is not read in that case.
pub fn read_unicode_string<Driver>(vmi: &VmiCore<Driver>, va: Va) -> Result<String, WindowsError>
where
    Driver: VmiDriver,
{
    let string = vmi.read_struct::<UnicodeString64>(va)?;
    let length = u16::from_le(string.length);
    let maximum_length = u16::from_le(string.maximum_length);
    let buffer = Va(u64::from_le(string.buffer));

    if length > maximum_length {
        tracing::warn!(%va, length, maximum_length, "corrupted UNICODE_STRING");
        return Err(WindowsError::CorruptedStruct("UNICODE_STRING"));
    }

    if length == 0 {
        return Ok(String::new());
    }

    let mut data = vec![0u8; length as usize];
    vmi.read(buffer, &mut data)?;

    decode_utf16(&data).ok_or(WindowsError::CorruptedStruct("UNICODE_STRING.Buffer"))
}

/// Returns the last component of a Windows or NT path.
pub fn file_name(path: &str) -> Option<&str> {
    path.rsplit(|c| c == '\\' || c == '/')
        .next()
        .filter(|name| !name.is_empty())
}
