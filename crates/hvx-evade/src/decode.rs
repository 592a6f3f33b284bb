use hvx_core::{HvxError, Va};

/// Value recorded for a routine whose number could not be resolved.
pub const INVALID_SYSCALL_NUMBER: u32 = u32::MAX;

/// Maximum number of relative jumps followed before decoding.
const MAX_JUMP_DEPTH: usize = 4;

/// Number of bytes scanned for the `mov eax, imm32` opcode.
const SCAN_WINDOW: usize = 16;

/// `mov r10, rcx`
const KERNEL_STUB_PROLOGUE: [u8; 3] = [0x4c, 0x8b, 0xd1];

const OPCODE_JMP_REL32: u8 = 0xe9;
const OPCODE_JMP_REL8: u8 = 0xeb;
const OPCODE_MOV_EAX_IMM32: u8 = 0xb8;

/// Where system-service stubs are found and read.
///
/// Reads may fail at any point; a failure only affects the routine being
/// decoded.
pub trait SyscallSource {
    /// Resolves the entry address of a named routine.
    fn routine_address(&self, name: &str) -> Option<Va>;

    /// Reads code bytes at `va`.
    fn read_code(&self, va: Va, buffer: &mut [u8]) -> Result<(), HvxError>;
}

/// Recovers the system-service number embedded in the stub at `routine`.
///
/// Follows up to four `jmp rel32` / `jmp rel8` redirections, skips a
/// leading `mov r10, rcx`, then looks for `mov eax, imm32` within the next
/// 16 bytes. Returns `None` if a read fails or no such instruction is
/// found.
pub fn decode_syscall_number(source: &(impl SyscallSource + ?Sized), routine: Va) -> Option<u32> {
    if routine.is_null() {
        return None;
    }

    let mut code = follow_jumps(source, routine)?;

    let mut prologue = [0u8; KERNEL_STUB_PROLOGUE.len()];
    if source.read_code(code, &mut prologue).is_ok() && prologue == KERNEL_STUB_PROLOGUE {
        code = code.wrapping_add(KERNEL_STUB_PROLOGUE.len() as u64);
    }

    let opcode = find_mov_eax(source, code)?;

    let mut immediate = [0u8; 4];
    read(source, opcode.wrapping_add(1), &mut immediate)?;

    Some(u32::from_le_bytes(immediate))
}

/// Reads one byte at a time and stops at the opcode.
fn find_mov_eax(source: &(impl SyscallSource + ?Sized), code: Va) -> Option<Va> {
    for offset in 0..SCAN_WINDOW as u64 {
        let address = code.wrapping_add(offset);
        let mut opcode = [0u8; 1];
        read(source, address, &mut opcode)?;

        if opcode[0] == OPCODE_MOV_EAX_IMM32 {
            return Some(address);
        }
    }

    None
}

fn follow_jumps(source: &(impl SyscallSource + ?Sized), mut address: Va) -> Option<Va> {
    for _ in 0..MAX_JUMP_DEPTH {
        let mut opcode = [0u8; 1];
        read(source, address, &mut opcode)?;

        address = match opcode[0] {
            OPCODE_JMP_REL32 => {
                let mut rel = [0u8; 4];
                read(source, address.wrapping_add(1), &mut rel)?;
                address.wrapping_add_signed(5 + i64::from(i32::from_le_bytes(rel)))
            }
            OPCODE_JMP_REL8 => {
                let mut rel = [0u8; 1];
                read(source, address.wrapping_add(1), &mut rel)?;
                address.wrapping_add_signed(2 + i64::from(rel[0] as i8))
            }
            _ => break,
        };
    }

    Some(address)
}

fn read(source: &(impl SyscallSource + ?Sized), va: Va, buffer: &mut [u8]) -> Option<()> {
    match source.read_code(va, buffer) {
        Ok(()) => Some(()),
        Err(err) => {
            tracing::trace!(%va, %err, "failed to read stub code");
            None
        }
    }
}
