use thiserror::Error;

use crate::{jit::JitError, loader::LoadError};

/// Errors that the dispatch loop and its collaborators can return.
#[derive(Error, Debug)]
pub enum VmError {
    /// Native code generation failed for the block at `pc`.
    #[error("failed to translate block at {pc:#010x}: {source}")]
    Translation {
        pc: u32,
        #[source]
        source: JitError,
    },

    /// The native code generator could not be set up for the host.
    #[error("failed to initialize the jit: {0}")]
    JitSetup(#[source] JitError),

    /// A load, store or fetch touched bytes outside guest memory.
    #[error("invalid {width}-byte memory access at {addr:#010x} (pc {pc:#010x})")]
    MemoryFault { pc: u32, addr: u32, width: usize },

    /// An instruction outside RV32I was executed under the strict policy.
    #[error("illegal instruction {word:#010x} at pc {pc:#010x}")]
    IllegalInstruction { pc: u32, word: u32 },

    /// The program image could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// A fault raised while executing guest code.
///
/// Faults are recorded on the CPU instead of being returned, so that the
/// interpreter and native call-outs report them the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Memory { pc: u32, addr: u32, width: usize },
    Illegal { pc: u32, word: u32 },
}

impl Fault {
    /// Address of the faulting instruction.
    pub fn pc(&self) -> u32 {
        match *self {
            Fault::Memory { pc, .. } | Fault::Illegal { pc, .. } => pc,
        }
    }
}

impl From<Fault> for VmError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Memory { pc, addr, width } => VmError::MemoryFault { pc, addr, width },
            Fault::Illegal { pc, word } => VmError::IllegalInstruction { pc, word },
        }
    }
}

impl VmError {
    /// Process status code reported by `run_simulation` for this error.
    pub fn status_code(&self) -> i32 {
        match self {
            VmError::Translation { .. } | VmError::JitSetup(_) => 2,
            VmError::MemoryFault { .. } => 3,
            VmError::IllegalInstruction { .. } => 4,
            VmError::Load(_) => 5,
        }
    }
}
