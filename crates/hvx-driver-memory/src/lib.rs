//! In-memory guest driver.
//!
//! [`MemoryDriver`] emulates the collaborators the introspection core
//! consumes: guest physical frames, per-process virtual mappings and a
//! process table. Frames are allocated in a deliberately scattered order so
//! that virtually contiguous pages are never physically contiguous.
//!
//! Every physical read is recorded, which lets tests assert how a transfer
//! was split into page-bounded chunks.

mod error;

use std::{cell::RefCell, collections::HashMap};

use bitflags::bitflags;
use hvx_core::{
    AddressTranslator, HvxError, PAGE_SIZE, Pa, PhysicalMemory, ProcessId, ProcessObject,
    ProcessResolver, Va, page_chunk_len,
};

pub use self::error::MemoryDriverError;

bitflags! {
    /// Access permitted on a physical frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameProtection: u8 {
        /// The frame can be read.
        const READ = 1 << 0;

        /// The frame can be written.
        const WRITE = 1 << 1;

        /// The frame can be read and written.
        const RW = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// A recorded physical access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalAccess {
    /// The physical address of the access.
    pub pa: Pa,

    /// The length of the access in bytes.
    pub len: usize,
}

struct Frame {
    data: Box<[u8]>,
    protection: FrameProtection,
}

struct Process {
    root: Pa,
    peb: Va,
    wow64_peb: Option<Va>,
}

/// An emulated guest.
pub struct MemoryDriver {
    frames: RefCell<HashMap<u64, Frame>>,
    spaces: HashMap<Pa, HashMap<u64, u64>>,
    processes: HashMap<ProcessId, Process>,
    next_frame: u64,
    reads: RefCell<Vec<PhysicalAccess>>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    /// Creates an empty guest.
    pub fn new() -> Self {
        Self {
            frames: RefCell::new(HashMap::new()),
            spaces: HashMap::new(),
            processes: HashMap::new(),
            next_frame: 0,
            reads: RefCell::new(Vec::new()),
        }
    }

    /// Creates a process with an empty address space and returns its
    /// page-table root.
    pub fn create_process(&mut self, pid: ProcessId) -> Pa {
        let root = Pa(self.allocate_frame() << 12);
        self.spaces.insert(root, HashMap::new());
        self.processes.insert(
            pid,
            Process {
                root,
                peb: Va(0),
                wow64_peb: None,
            },
        );

        tracing::trace!(%pid, %root, "process created");
        root
    }

    /// Removes a process. Its frames stay allocated.
    pub fn remove_process(&mut self, pid: ProcessId) {
        if let Some(process) = self.processes.remove(&pid) {
            self.spaces.remove(&process.root);
        }
    }

    /// Sets the native environment block address of a process.
    pub fn set_peb(&mut self, pid: ProcessId, peb: Va) -> Result<(), MemoryDriverError> {
        self.process_mut(pid)?.peb = peb;
        Ok(())
    }

    /// Marks a process as WoW64 and sets its 32-bit environment block.
    pub fn set_wow64_peb(&mut self, pid: ProcessId, peb: Va) -> Result<(), MemoryDriverError> {
        self.process_mut(pid)?.wow64_peb = Some(peb);
        Ok(())
    }

    /// Maps every page of `[va, va + len)` that is not mapped yet.
    pub fn map(&mut self, pid: ProcessId, va: Va, len: usize) -> Result<(), MemoryDriverError> {
        let root = self.root(pid)?;
        let first = va.0 >> 12;
        let last = va.0.saturating_add(len.max(1) as u64 - 1) >> 12;

        for vpn in first..=last {
            let mapped = self
                .spaces
                .get(&root)
                .is_some_and(|space| space.contains_key(&vpn));

            if mapped {
                continue;
            }

            let pfn = self.allocate_frame();
            self.spaces.entry(root).or_default().insert(vpn, pfn);
        }

        Ok(())
    }

    /// Removes the mapping of the page containing `va`.
    pub fn unmap(&mut self, pid: ProcessId, va: Va) -> Result<(), MemoryDriverError> {
        let root = self.root(pid)?;
        if let Some(space) = self.spaces.get_mut(&root) {
            space.remove(&(va.0 >> 12));
        }
        Ok(())
    }

    /// Changes the protection of the frame backing the page containing `va`.
    pub fn protect(
        &mut self,
        pid: ProcessId,
        va: Va,
        protection: FrameProtection,
    ) -> Result<(), MemoryDriverError> {
        let root = self.root(pid)?;
        let pa = self
            .translate(root, va)
            .ok_or(MemoryDriverError::FrameNotPresent(Pa(0)))?;

        let mut frames = self.frames.borrow_mut();
        let frame = frames
            .get_mut(&(pa.0 >> 12))
            .ok_or(MemoryDriverError::FrameNotPresent(pa))?;
        frame.protection = protection;
        Ok(())
    }

    /// Writes `data` into process memory, mapping pages as needed.
    ///
    /// Frame protection is ignored; this is the "guest writes its own
    /// memory" path used to build scenarios.
    pub fn write(&mut self, pid: ProcessId, va: Va, data: &[u8]) -> Result<(), MemoryDriverError> {
        if data.is_empty() {
            return Ok(());
        }

        self.map(pid, va, data.len())?;
        let root = self.root(pid)?;

        let mut position = 0usize;
        while position < data.len() {
            let current = va.wrapping_add(position as u64);
            let size = page_chunk_len(current, data.len() - position);
            let pa = self
                .translate(root, current)
                .ok_or(MemoryDriverError::FrameNotPresent(Pa(0)))?;

            let mut frames = self.frames.borrow_mut();
            let frame = frames
                .get_mut(&(pa.0 >> 12))
                .ok_or(MemoryDriverError::FrameNotPresent(pa))?;
            let offset = pa.page_offset() as usize;
            frame.data[offset..offset + size].copy_from_slice(&data[position..position + size]);

            position += size;
        }

        Ok(())
    }

    /// Writes a little-endian 16-bit value.
    pub fn write_u16(&mut self, pid: ProcessId, va: Va, value: u16) -> Result<(), MemoryDriverError> {
        self.write(pid, va, &value.to_le_bytes())
    }

    /// Writes a little-endian 32-bit value.
    pub fn write_u32(&mut self, pid: ProcessId, va: Va, value: u32) -> Result<(), MemoryDriverError> {
        self.write(pid, va, &value.to_le_bytes())
    }

    /// Writes a little-endian 64-bit value.
    pub fn write_u64(&mut self, pid: ProcessId, va: Va, value: u64) -> Result<(), MemoryDriverError> {
        self.write(pid, va, &value.to_le_bytes())
    }

    /// Returns every physical read issued so far, in order.
    pub fn physical_reads(&self) -> Vec<PhysicalAccess> {
        self.reads.borrow().clone()
    }

    /// Forgets the recorded physical reads.
    pub fn clear_physical_reads(&self) {
        self.reads.borrow_mut().clear();
    }

    fn allocate_frame(&mut self) -> u64 {
        // Spread frames out so neighbouring pages never share a frame run.
        let pfn = 0x100 + self.next_frame * 7 + (self.next_frame % 3) * 0x40;
        self.next_frame += 1;

        self.frames.borrow_mut().insert(
            pfn,
            Frame {
                data: vec![0u8; PAGE_SIZE as usize].into_boxed_slice(),
                protection: FrameProtection::RW,
            },
        );

        pfn
    }

    fn root(&self, pid: ProcessId) -> Result<Pa, MemoryDriverError> {
        self.processes
            .get(&pid)
            .map(|process| process.root)
            .ok_or(MemoryDriverError::ProcessNotFound(pid))
    }

    fn process_mut(&mut self, pid: ProcessId) -> Result<&mut Process, MemoryDriverError> {
        self.processes
            .get_mut(&pid)
            .ok_or(MemoryDriverError::ProcessNotFound(pid))
    }

    fn frame_access(
        &self,
        pa: Pa,
        len: usize,
        required: FrameProtection,
    ) -> Result<(u64, usize), MemoryDriverError> {
        let offset = pa.page_offset() as usize;
        if offset + len > PAGE_SIZE as usize {
            return Err(MemoryDriverError::CrossesFrame(pa, len));
        }

        let frames = self.frames.borrow();
        let frame = frames
            .get(&(pa.0 >> 12))
            .ok_or(MemoryDriverError::FrameNotPresent(pa))?;

        if !frame.protection.contains(required) {
            return Err(MemoryDriverError::AccessDenied(pa));
        }

        Ok((pa.0 >> 12, offset))
    }
}

impl PhysicalMemory for MemoryDriver {
    fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), HvxError> {
        self.reads.borrow_mut().push(PhysicalAccess {
            pa,
            len: buffer.len(),
        });

        let (pfn, offset) = self.frame_access(pa, buffer.len(), FrameProtection::READ)?;
        let frames = self.frames.borrow();
        let frame = frames
            .get(&pfn)
            .ok_or(MemoryDriverError::FrameNotPresent(pa))?;
        buffer.copy_from_slice(&frame.data[offset..offset + buffer.len()]);
        Ok(())
    }

    fn write_physical(&self, pa: Pa, buffer: &[u8]) -> Result<(), HvxError> {
        let (pfn, offset) = self.frame_access(pa, buffer.len(), FrameProtection::WRITE)?;
        let mut frames = self.frames.borrow_mut();
        let frame = frames
            .get_mut(&pfn)
            .ok_or(MemoryDriverError::FrameNotPresent(pa))?;
        frame.data[offset..offset + buffer.len()].copy_from_slice(buffer);
        Ok(())
    }
}

impl AddressTranslator for MemoryDriver {
    fn page_table_root(&self, pid: ProcessId) -> Option<Pa> {
        self.processes.get(&pid).map(|process| process.root)
    }

    fn translate(&self, root: Pa, va: Va) -> Option<Pa> {
        let pfn = self.spaces.get(&root)?.get(&(va.0 >> 12))?;
        Some(Pa((pfn << 12) | va.page_offset()))
    }
}

impl ProcessResolver for MemoryDriver {
    fn lookup_process(&self, pid: ProcessId) -> Option<ProcessObject> {
        self.processes.get(&pid).map(|process| ProcessObject {
            id: pid,
            peb: process.peb,
            wow64_peb: process.wow64_peb,
        })
    }
}
