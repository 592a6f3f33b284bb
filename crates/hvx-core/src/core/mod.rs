mod address;
pub(crate) mod macros;
mod space;

pub use self::{
    address::{Pa, ProcessId, Va},
    space::{Bitness, ProcessAddressSpace, ProcessObject},
};
