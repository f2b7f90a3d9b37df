//! Emulator Configuration

use crate::constants;
use serde::{Deserialize, Serialize};

/// Execution strategy used by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Interpret every basic block.
    Interpreter,
    /// Interpret cold blocks and compile hot ones to native code.
    #[default]
    Jit,
}

/// What to do with instruction words outside of RV32I.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsupportedPolicy {
    /// Log a warning and treat the instruction as a no-op.
    #[default]
    Skip,
    /// Stop execution with [`crate::VmError::IllegalInstruction`].
    Fault,
}

/// Configuration for an emulator session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Execution strategy
    pub mode: ExecMode,

    /// Minimum basic-block length before a block is compiled to native code.
    /// Only consulted in [`ExecMode::Jit`]. Default: constants::BB_THRESHOLD
    pub hot_threshold: usize,

    /// Handling of unsupported instruction encodings
    pub unsupported: UnsupportedPolicy,

    /// Size of guest memory in bytes. Default: constants::DEFAULT_MEMORY_SIZE
    pub memory_size: usize,

    /// Initial stack pointer (x2). Default: constants::STACK_POINTER_INIT
    pub stack_pointer: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatorConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self {
            mode: ExecMode::default(),
            hot_threshold: constants::BB_THRESHOLD,
            unsupported: UnsupportedPolicy::default(),
            memory_size: constants::DEFAULT_MEMORY_SIZE,
            stack_pointer: constants::STACK_POINTER_INIT,
        }
    }

    /// Set the execution strategy
    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the block length at which blocks are compiled
    pub fn with_hot_threshold(mut self, hot_threshold: usize) -> Self {
        self.hot_threshold = hot_threshold;
        self
    }

    /// Set the policy for unsupported instructions
    pub fn with_unsupported_policy(mut self, policy: UnsupportedPolicy) -> Self {
        self.unsupported = policy;
        self
    }

    /// Set the guest memory size in bytes
    pub fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
    }

    /// Set the initial stack pointer
    pub fn with_stack_pointer(mut self, stack_pointer: u32) -> Self {
        self.stack_pointer = stack_pointer;
        self
    }

    /// Whether hot blocks are compiled to native code.
    pub fn jit_enabled(&self) -> bool {
        self.mode == ExecMode::Jit
    }
}
