//! Guest execution: CPU state, memory, syscalls, the block cache, the
//! interpreter and the dispatch loop that ties them to the JIT.

mod block;
mod cpu;
mod dispatch;
mod interpreter;
mod memory;
mod registers;
mod syscall;

pub use block::{BasicBlock, BlockCache};
pub use cpu::Cpu;
pub use dispatch::{DispatchStats, Emulator};
pub use memory::{Memory, OutOfBounds, Scalar};
pub use syscall::SyscallCode;
