//! Core types and the stealthy memory reader.
//!
//! Everything in the hvx workspace is built on two primitives supplied by the
//! hypervisor: a fault-free physical memory accessor and a guest page-table
//! walker. This crate defines those collaborators as traits
//! ([`PhysicalMemory`], [`AddressTranslator`], [`ProcessResolver`]) and builds
//! the [`StealthyReader`] on top of them.

mod core;
mod driver;
mod error;
mod reader;

pub use self::{
    core::{Bitness, Pa, ProcessAddressSpace, ProcessId, ProcessObject, Va},
    driver::{AddressTranslator, HvxDriver, PhysicalMemory, ProcessResolver},
    error::HvxError,
    reader::{StealthyReader, page_chunk_len},
};

/// Size of a guest page.
pub const PAGE_SIZE: u64 = 0x1000;

/// Mask selecting the offset of an address within its page.
pub const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;
