use std::fmt;

use super::memory::Memory;
use crate::{
    compiler::riscv::register::Register,
    config::{EmulatorConfig, UnsupportedPolicy},
    constants::{NUM_REGISTERS, STACK_POINTER_INIT},
    error::Fault,
};

/// Guest CPU state.
///
/// The layout is `repr(C)` because compiled blocks receive a pointer to this
/// struct and address `regs`, `pc` and `done` by field offset.
#[repr(C)]
pub struct Cpu<'m> {
    /// 32 general-purpose registers (x0-x31). x0 is never written.
    pub(crate) regs: [u32; NUM_REGISTERS],
    /// Program counter
    pub(crate) pc: u32,
    /// Set by exit, ebreak and faults; stops the dispatch loop.
    pub(crate) done: bool,
    /// Status passed to the exit syscall.
    pub(crate) exit_code: Option<i32>,
    /// First fault raised since the last `take_fault`.
    pub(crate) fault: Option<Fault>,
    /// Handling of unsupported instructions in the interpreter.
    pub(crate) unsupported: UnsupportedPolicy,
    /// Guest memory, owned by the caller.
    pub(crate) memory: &'m mut Memory,
}

impl<'m> Cpu<'m> {
    // ========================================================================
    // Construction & Initialization
    // ========================================================================

    /// Create a CPU over `memory` that starts executing at `entry`.
    ///
    /// All registers are zero except the stack pointer.
    pub fn new(memory: &'m mut Memory, entry: u32) -> Self {
        let mut regs = [0; NUM_REGISTERS];
        regs[Register::SP.index()] = STACK_POINTER_INIT;
        Self {
            regs,
            pc: entry,
            done: false,
            exit_code: None,
            fault: None,
            unsupported: UnsupportedPolicy::default(),
            memory,
        }
    }

    /// Create a CPU using the stack pointer and decode policy of `config`.
    pub fn configured(memory: &'m mut Memory, entry: u32, config: &EmulatorConfig) -> Self {
        let mut cpu = Self::new(memory, entry);
        cpu.regs[Register::SP.index()] = config.stack_pointer;
        cpu.unsupported = config.unsupported;
        cpu
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline(always)]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    #[inline(always)]
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    #[inline(always)]
    pub fn registers(&self) -> &[u32; NUM_REGISTERS] {
        &self.regs
    }

    /// Whether the guest has finished (or faulted).
    #[inline(always)]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Status passed to the exit syscall, if the guest exited that way.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn memory(&self) -> &Memory {
        &*self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut *self.memory
    }

    // ========================================================================
    // Faults
    // ========================================================================

    /// Record a fault and stop execution. Only the first fault is kept.
    pub(crate) fn raise(&mut self, fault: Fault) {
        if self.fault.is_none() {
            self.fault = Some(fault);
            self.pc = fault.pc();
        }
        self.done = true;
    }

    /// The pending fault, if any.
    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    /// Clear and return the pending fault.
    pub fn take_fault(&mut self) -> Option<Fault> {
        self.fault.take()
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Register dump: a `regs:` header, the pc, then one `xN = value` line
    /// per register with values printed as signed integers.
    pub fn dump(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Cpu<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "regs:")?;
        writeln!(f, "pc: {}", self.pc)?;
        for (i, value) in self.regs.iter().enumerate() {
            writeln!(f, "x{i} = {}", *value as i32)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Cpu<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("pc", &format_args!("{:#010x}", self.pc))
            .field("regs", &self.regs)
            .field("done", &self.done)
            .field("exit_code", &self.exit_code)
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}
