/// A hexadecimal representation of a value.
///
/// Values are zero-padded to the width of their type, which keeps guest
/// addresses aligned in log output.
///
/// # Examples
///
/// ```
/// # use ntvmi_core::Hex;
/// assert_eq!(format!("{}", Hex(42u16)), "0x002a");
/// assert_eq!(format!("{}", Hex(0x1000u64)), "0x0000000000001000");
/// ```
pub struct Hex<T>(pub T);

fn fmt_padded<T>(f: &mut ::std::fmt::Formatter, value: T) -> ::std::fmt::Result
where
    T: Copy + ::std::fmt::LowerHex,
{
    match size_of::<T>() {
        1 => write!(f, "0x{:02x}", value),
        2 => write!(f, "0x{:04x}", value),
        4 => write!(f, "0x{:08x}", value),
        8 => write!(f, "0x{:016x}", value),
        _ => write!(f, "0x{:x}", value),
    }
}

macro_rules! impl_hex {
    ($($type:ty),*) => {
        $(
            impl ::std::fmt::Debug for Hex<$type> {
                fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                    fmt_padded(f, self.0)
                }
            }

            impl ::std::fmt::Display for Hex<$type> {
                fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                    fmt_padded(f, self.0)
                }
            }
        )*
    };
}

impl_hex!(u8, u16, u32, u64, usize);
