//! Minimal layouts of the remote loader structures.
//!
//! Each structure covers only the prefix the enumerator needs. Padding is
//! spelled out so the layouts can be read and written as plain bytes.

mod ldr;
mod list_entry;
mod peb;
mod unicode_string;

pub use self::{
    ldr::{LdrDataTableEntry32, LdrDataTableEntry64, PebLdrData32, PebLdrData64},
    list_entry::{ListEntry32, ListEntry64},
    peb::{Peb32, Peb64},
    unicode_string::{RemoteUnicodeString, UnicodeString32, UnicodeString64},
};
