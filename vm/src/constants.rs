//! Emulator Tunable Constants
//!
//! Guest ABI values and execution-tiering defaults are centralized here.
//! [`crate::config::EmulatorConfig`] takes its defaults from these values.

// =============================================================================
// Guest ABI Constants
// =============================================================================

/// Number of general-purpose registers (x0-x31).
pub const NUM_REGISTERS: usize = 32;

/// Size of every RV32I instruction in bytes (no compressed extension).
pub const INSTRUCTION_SIZE: u32 = 4;

/// Initial value of the stack pointer (x2) at CPU construction.
pub const STACK_POINTER_INIT: u32 = 0x000a_effc;

/// Default size of guest memory in bytes.
pub const DEFAULT_MEMORY_SIZE: usize = 0x00ff_ffff;

// =============================================================================
// Block Cache Constants
// =============================================================================

/// Expected number of instructions in a basic block.
/// Used as the initial capacity when a block is built.
pub const BB_AVERAGE_SIZE: usize = 10;

/// Minimum basic-block length that triggers native compilation.
/// Blocks with at least this many instructions are translated the first
/// time they are dispatched after being cached.
pub const BB_THRESHOLD: usize = 10;
