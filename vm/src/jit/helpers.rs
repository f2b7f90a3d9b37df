//! Runtime call-outs used by compiled blocks.
//!
//! Memory accesses and syscalls are not inlined into native code. Each one
//! calls back into the [`Cpu`] through an `extern "C"` helper that takes the
//! CPU pointer first and the address of the calling instruction last, so
//! faults are attributed exactly as the interpreter attributes them.

use cranelift_codegen::ir::{types, AbiParam, Signature, Type};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::Module;
use strum::{EnumCount, EnumIter};

use crate::{
    emulator::{Cpu, SyscallCode},
    error::Fault,
};

/// Helpers imported by every compiled block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCount)]
pub(crate) enum Helper {
    LoadI8,
    LoadI16,
    LoadI32,
    StoreU8,
    StoreU16,
    StoreU32,
    Read,
    Write,
    Close,
    Lseek,
    Exit,
    Illegal,
}

impl Helper {
    /// Symbol the helper is registered under in the JIT module.
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Helper::LoadI8 => "rvjit_load_i8",
            Helper::LoadI16 => "rvjit_load_i16",
            Helper::LoadI32 => "rvjit_load_i32",
            Helper::StoreU8 => "rvjit_store_u8",
            Helper::StoreU16 => "rvjit_store_u16",
            Helper::StoreU32 => "rvjit_store_u32",
            Helper::Read => "rvjit_sys_read",
            Helper::Write => "rvjit_sys_write",
            Helper::Close => "rvjit_sys_close",
            Helper::Lseek => "rvjit_sys_lseek",
            Helper::Exit => "rvjit_sys_exit",
            Helper::Illegal => "rvjit_illegal",
        }
    }

    fn address(self) -> *const u8 {
        match self {
            Helper::LoadI8 => load_i8 as *const u8,
            Helper::LoadI16 => load_i16 as *const u8,
            Helper::LoadI32 => load_i32 as *const u8,
            Helper::StoreU8 => store_u8 as *const u8,
            Helper::StoreU16 => store_u16 as *const u8,
            Helper::StoreU32 => store_u32 as *const u8,
            Helper::Read => sys_read as *const u8,
            Helper::Write => sys_write as *const u8,
            Helper::Close => sys_close as *const u8,
            Helper::Lseek => sys_lseek as *const u8,
            Helper::Exit => sys_exit as *const u8,
            Helper::Illegal => illegal as *const u8,
        }
    }

    /// The syscall helper for `code`.
    pub(crate) fn for_syscall(code: SyscallCode) -> Self {
        match code {
            SyscallCode::READ => Helper::Read,
            SyscallCode::WRITE => Helper::Write,
            SyscallCode::CLOSE => Helper::Close,
            SyscallCode::LSEEK => Helper::Lseek,
            SyscallCode::EXIT => Helper::Exit,
        }
    }

    /// Native signature: the CPU pointer followed by 32-bit arguments.
    ///
    /// | helper  | arguments          | result |
    /// |---------|--------------------|--------|
    /// | load    | `addr, pc`         | `i32`  |
    /// | store   | `addr, value, pc`  |        |
    /// | syscall | `pc`               |        |
    /// | illegal | `word, pc`         |        |
    pub(crate) fn signature(self, module: &JITModule) -> Signature {
        let (params, returns): (&[Type], &[Type]) = match self {
            Helper::LoadI8 | Helper::LoadI16 | Helper::LoadI32 => {
                (&[types::I32, types::I32], &[types::I32])
            }
            Helper::StoreU8 | Helper::StoreU16 | Helper::StoreU32 => {
                (&[types::I32, types::I32, types::I32], &[])
            }
            Helper::Read | Helper::Write | Helper::Close | Helper::Lseek | Helper::Exit => {
                (&[types::I32], &[])
            }
            Helper::Illegal => (&[types::I32, types::I32], &[]),
        };

        let mut sig = module.make_signature();
        sig.params
            .push(AbiParam::new(module.target_config().pointer_type()));
        sig.params.extend(params.iter().copied().map(AbiParam::new));
        sig.returns.extend(returns.iter().copied().map(AbiParam::new));
        sig
    }
}

/// Make every helper resolvable by symbol name.
pub(crate) fn register_symbols(builder: &mut JITBuilder) {
    use strum::IntoEnumIterator;

    for helper in Helper::iter() {
        builder.symbol(helper.symbol(), helper.address());
    }
}

// ============================================================================
// Helpers
// ============================================================================

extern "C" fn load_i8(cpu: &mut Cpu<'_>, addr: u32, pc: u32) -> u32 {
    cpu.load::<i8>(pc, addr).map_or(0, |v| v as i32 as u32)
}

extern "C" fn load_i16(cpu: &mut Cpu<'_>, addr: u32, pc: u32) -> u32 {
    cpu.load::<i16>(pc, addr).map_or(0, |v| v as i32 as u32)
}

extern "C" fn load_i32(cpu: &mut Cpu<'_>, addr: u32, pc: u32) -> u32 {
    cpu.load::<u32>(pc, addr).unwrap_or(0)
}

extern "C" fn store_u8(cpu: &mut Cpu<'_>, addr: u32, value: u32, pc: u32) {
    cpu.store::<u8>(pc, addr, value as u8)
}

extern "C" fn store_u16(cpu: &mut Cpu<'_>, addr: u32, value: u32, pc: u32) {
    cpu.store::<u16>(pc, addr, value as u16)
}

extern "C" fn store_u32(cpu: &mut Cpu<'_>, addr: u32, value: u32, pc: u32) {
    cpu.store::<u32>(pc, addr, value)
}

extern "C" fn sys_read(cpu: &mut Cpu<'_>, pc: u32) {
    cpu.syscall(SyscallCode::READ, pc)
}

extern "C" fn sys_write(cpu: &mut Cpu<'_>, pc: u32) {
    cpu.syscall(SyscallCode::WRITE, pc)
}

extern "C" fn sys_close(cpu: &mut Cpu<'_>, pc: u32) {
    cpu.syscall(SyscallCode::CLOSE, pc)
}

extern "C" fn sys_lseek(cpu: &mut Cpu<'_>, pc: u32) {
    cpu.syscall(SyscallCode::LSEEK, pc)
}

extern "C" fn sys_exit(cpu: &mut Cpu<'_>, pc: u32) {
    cpu.syscall(SyscallCode::EXIT, pc)
}

extern "C" fn illegal(cpu: &mut Cpu<'_>, word: u32, pc: u32) {
    cpu.raise(Fault::Illegal { pc, word })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compiler::riscv::register::Register, emulator::Memory};
    use strum::IntoEnumIterator;

    #[test]
    fn test_symbols_are_unique() {
        let mut symbols: Vec<&str> = Helper::iter().map(Helper::symbol).collect();
        symbols.sort_unstable();
        symbols.dedup();
        assert_eq!(symbols.len(), Helper::COUNT);
    }

    #[test]
    fn test_loads_sign_extend_and_fault() {
        let mut memory = Memory::new(16);
        memory.store::<u16>(4, 0xff80).unwrap();
        let mut cpu = Cpu::new(&mut memory, 0);
        assert_eq!(load_i8(&mut cpu, 4, 0), 0xffff_ff80);
        assert_eq!(load_i16(&mut cpu, 4, 0), 0xffff_ff80);
        assert_eq!(load_i32(&mut cpu, 4, 0), 0xff80);
        assert!(cpu.fault().is_none());

        assert_eq!(load_i32(&mut cpu, 14, 0x20), 0);
        assert_eq!(
            cpu.fault(),
            Some(Fault::Memory {
                pc: 0x20,
                addr: 14,
                width: 4
            })
        );
        assert!(cpu.is_done());
    }

    #[test]
    fn test_stores_truncate() {
        let mut memory = Memory::new(16);
        let mut cpu = Cpu::new(&mut memory, 0);
        store_u32(&mut cpu, 0, 0x1122_3344, 0);
        store_u16(&mut cpu, 4, 0x1122_3344, 0);
        store_u8(&mut cpu, 8, 0x1122_3344, 0);
        assert_eq!(cpu.memory().load::<u32>(0), Ok(0x1122_3344));
        assert_eq!(cpu.memory().load::<u32>(4), Ok(0x3344));
        assert_eq!(cpu.memory().load::<u32>(8), Ok(0x44));
    }

    #[test]
    fn test_exit_and_illegal() {
        let mut memory = Memory::new(16);
        let mut cpu = Cpu::new(&mut memory, 0);
        cpu.set_reg(Register::A0, 3);
        sys_exit(&mut cpu, 8);
        assert_eq!(cpu.exit_code(), Some(3));
        illegal(&mut cpu, 0xdead, 12);
        assert_eq!(cpu.fault(), Some(Fault::Illegal { pc: 12, word: 0xdead }));
        assert_eq!(cpu.pc(), 12);
    }
}
