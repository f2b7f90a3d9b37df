//! Syscall Handling
//!
//! `ecall` selects a syscall by the number in a7. Arguments are taken from
//! a0..a2 and the result is written back to a0. Unknown numbers are ignored.

use strum::EnumIter;
use tracing::{debug, info};

use super::{memory::OutOfBounds, Cpu};
use crate::{compiler::riscv::register::Register, error::Fault};

/// System calls understood by the emulator (Linux RISC-V numbering).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
pub enum SyscallCode {
    /// `close(fd)`
    CLOSE = 57,
    /// `lseek(fd, offset, whence)`
    LSEEK = 62,
    /// `read(fd, buf, len)`
    READ = 63,
    /// `write(fd, buf, len)`
    WRITE = 64,
    /// `exit(status)`
    EXIT = 93,
}

impl SyscallCode {
    /// Create a [`SyscallCode`] from the value of a7.
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            57 => SyscallCode::CLOSE,
            62 => SyscallCode::LSEEK,
            63 => SyscallCode::READ,
            64 => SyscallCode::WRITE,
            93 => SyscallCode::EXIT,
            _ => return None,
        })
    }
}

impl Cpu<'_> {
    /// Execute the syscall selected by a7 for the `ecall` at `pc`.
    pub(crate) fn ecall(&mut self, pc: u32) {
        let number = self.reg(Register::A7);
        match SyscallCode::from_u32(number) {
            Some(code) => self.syscall(code, pc),
            None => debug!(number, pc, "ignoring unknown syscall"),
        }
    }

    pub(crate) fn syscall(&mut self, code: SyscallCode, pc: u32) {
        match code {
            SyscallCode::READ => self.sys_read(pc),
            SyscallCode::WRITE => self.sys_write(pc),
            SyscallCode::CLOSE => self.sys_close(),
            SyscallCode::LSEEK => self.sys_lseek(),
            SyscallCode::EXIT => self.sys_exit(),
        }
    }

    #[inline(always)]
    fn syscall_args(&self) -> (u32, u32, u32) {
        (
            self.reg(Register::A0),
            self.reg(Register::A1),
            self.reg(Register::A2),
        )
    }

    #[inline(always)]
    fn set_syscall_result(&mut self, value: i64) {
        self.set_reg(Register::A0, value as i32 as u32);
    }

    /// Read up to `len` bytes from a host descriptor into guest memory.
    fn sys_read(&mut self, pc: u32) {
        let (fd, buf, len) = self.syscall_args();
        let ret = match self.memory.bytes_mut(buf, len as usize) {
            // SAFETY: `bytes` is a live, exclusively borrowed region of `len` bytes.
            Ok(bytes) => unsafe { libc::read(fd as i32, bytes.as_mut_ptr().cast(), bytes.len()) },
            Err(OutOfBounds { addr, width }) => {
                self.raise(Fault::Memory { pc, addr, width });
                return;
            }
        };
        self.set_syscall_result(ret as i64);
    }

    /// Write `len` bytes of guest memory to a host descriptor.
    fn sys_write(&mut self, pc: u32) {
        let (fd, buf, len) = self.syscall_args();
        let ret = match self.memory.bytes(buf, len as usize) {
            // SAFETY: `bytes` is a live region of `len` bytes.
            Ok(bytes) => unsafe { libc::write(fd as i32, bytes.as_ptr().cast(), bytes.len()) },
            Err(OutOfBounds { addr, width }) => {
                self.raise(Fault::Memory { pc, addr, width });
                return;
            }
        };
        self.set_syscall_result(ret as i64);
    }

    fn sys_close(&mut self) {
        let (fd, _, _) = self.syscall_args();
        // SAFETY: closing an arbitrary descriptor has no memory-safety impact.
        let ret = unsafe { libc::close(fd as i32) };
        self.set_syscall_result(ret as i64);
    }

    fn sys_lseek(&mut self) {
        let (fd, offset, whence) = self.syscall_args();
        // SAFETY: lseek only inspects its integer arguments.
        let ret = unsafe { libc::lseek(fd as i32, offset as i32 as libc::off_t, whence as i32) };
        self.set_syscall_result(ret as i64);
    }

    fn sys_exit(&mut self) {
        let status = self.reg(Register::A0) as i32;
        info!(status, "guest exited");
        self.exit_code = Some(status);
        self.done = true;
    }
}
