mod address;
mod hex;
pub(crate) mod macros;

pub use self::{
    address::{Pa, Va},
    hex::Hex,
};
