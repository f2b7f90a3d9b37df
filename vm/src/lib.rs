//! RV32I User-Mode Emulation
//!
//! This crate runs 32-bit RISC-V (RV32I) user programs either through an
//! interpreter or through a basic-block JIT built on Cranelift.
//!
//! # Architecture
//!
//! The emulator is organized around these core concepts:
//!
//! - **`Instruction`**: A decoded instruction, one variant per opcode family
//! - **`BlockCache`**: Decoded basic blocks keyed by start address
//! - **`Cpu`**: Guest registers, pc and completion state over a borrowed `Memory`
//! - **`Jit`**: Lowers cached blocks to native functions taking the `Cpu` by pointer
//! - **`Emulator`**: The dispatch loop choosing between native code and interpretation
//!
//! # Usage Pattern
//!
//! ```ignore
//! use rvjit_vm::{loader, Cpu, Emulator, EmulatorConfig, Memory};
//!
//! let config = EmulatorConfig::default();
//! let mut memory = Memory::new(config.memory_size);
//! let image = loader::load_elf_file("fib.elf", &mut memory)?;
//! let mut cpu = Cpu::configured(&mut memory, image.entry_offset, &config);
//! let status = Emulator::new(config)?.run_simulation(&mut cpu);
//! print!("{}", cpu.dump());
//! ```

pub mod compiler;
pub mod config;
pub mod constants;
pub mod emulator;
pub mod error;
pub mod jit;
pub mod loader;
pub mod logger;

#[cfg(test)]
mod test_utils;

// Re-export core types
pub use compiler::riscv::{decoder::decode, instruction::Instruction};
pub use config::{EmulatorConfig, ExecMode, UnsupportedPolicy};
pub use emulator::{BasicBlock, BlockCache, Cpu, DispatchStats, Emulator, Memory};
pub use error::{Fault, VmError};
pub use jit::{Jit, JitError};
pub use loader::{LoadError, ProgramImage};
