//! Instruction Interpreter
//!
//! Executes decoded instructions directly against [`Cpu`] state. This is
//! the cold tier of the dispatch loop and the reference semantics that
//! compiled blocks must match.

use tracing::{trace, warn};

use super::{block::BasicBlock, Cpu};
use crate::{
    compiler::riscv::{
        instruction::Instruction,
        opcode::{LoadOp, StoreOp, SystemOp},
    },
    config::UnsupportedPolicy,
    error::Fault,
};

/// Control flow produced by a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Fall through to the next instruction.
    Next,
    /// Continue at the given address.
    Jump(u32),
}

impl Cpu<'_> {
    /// Execute `inst` located at `pc`.
    ///
    /// Register and memory effects are applied immediately; the new program
    /// counter is returned to the caller instead of being written.
    pub(crate) fn step(&mut self, pc: u32, inst: &Instruction) -> Flow {
        trace!(pc = format_args!("{pc:#x}"), "{inst}");
        match *inst {
            Instruction::Lui { rd, imm } => {
                self.set_reg(rd, imm);
                Flow::Next
            }
            Instruction::Auipc { rd, imm } => {
                self.set_reg(rd, pc.wrapping_add(imm));
                Flow::Next
            }
            Instruction::Jal { rd, imm } => {
                self.set_reg(rd, pc.wrapping_add(inst.size()));
                Flow::Jump(pc.wrapping_add(imm as u32))
            }
            Instruction::Jalr { rd, rs1, imm } => {
                // Target is computed before rd is written (rd may equal rs1).
                let target = self.reg(rs1).wrapping_add(imm as u32) & !1;
                self.set_reg(rd, pc.wrapping_add(inst.size()));
                Flow::Jump(target)
            }
            Instruction::Branch { op, rs1, rs2, imm } => {
                if op.taken(self.reg(rs1), self.reg(rs2)) {
                    Flow::Jump(pc.wrapping_add(imm as u32))
                } else {
                    Flow::Jump(pc.wrapping_add(inst.size()))
                }
            }
            Instruction::Load { op, rd, rs1, imm } => {
                let addr = self.reg(rs1).wrapping_add(imm as u32);
                let value = match op {
                    LoadOp::LB => self.load::<i8>(pc, addr).map(|v| v as i32 as u32),
                    LoadOp::LH => self.load::<i16>(pc, addr).map(|v| v as i32 as u32),
                    LoadOp::LW => self.load::<u32>(pc, addr),
                    LoadOp::LBU => self.load::<u8>(pc, addr).map(u32::from),
                    LoadOp::LHU => self.load::<u16>(pc, addr).map(u32::from),
                };
                if let Some(value) = value {
                    self.set_reg(rd, value);
                }
                Flow::Next
            }
            Instruction::Store { op, rs1, rs2, imm } => {
                let addr = self.reg(rs1).wrapping_add(imm as u32);
                let value = self.reg(rs2);
                match op {
                    StoreOp::SB => self.store::<u8>(pc, addr, value as u8),
                    StoreOp::SH => self.store::<u16>(pc, addr, value as u16),
                    StoreOp::SW => self.store::<u32>(pc, addr, value),
                }
                Flow::Next
            }
            Instruction::Imm { op, rd, rs1, imm } => {
                self.set_reg(rd, op.apply(self.reg(rs1), imm as u32));
                Flow::Next
            }
            Instruction::Op { op, rd, rs1, rs2 } => {
                self.set_reg(rd, op.apply(self.reg(rs1), self.reg(rs2)));
                Flow::Next
            }
            Instruction::Fence => Flow::Next,
            Instruction::System(SystemOp::ECALL) => {
                self.ecall(pc);
                Flow::Jump(pc.wrapping_add(inst.size()))
            }
            Instruction::System(SystemOp::EBREAK) => {
                self.done = true;
                Flow::Jump(pc.wrapping_add(inst.size()))
            }
            Instruction::Unsupported { word } => {
                match self.unsupported {
                    UnsupportedPolicy::Skip => {
                        warn!(
                            pc = format_args!("{pc:#x}"),
                            word = format_args!("{word:#010x}"),
                            "skipping unsupported instruction"
                        );
                    }
                    UnsupportedPolicy::Fault => self.raise(Fault::Illegal { pc, word }),
                }
                Flow::Next
            }
        }
    }

    /// Execute a single instruction at the current pc and advance it.
    pub fn execute(&mut self, inst: &Instruction) {
        let pc = self.pc;
        let flow = self.step(pc, inst);
        if self.fault.is_some() {
            return;
        }
        self.pc = match flow {
            Flow::Next => pc.wrapping_add(inst.size()),
            Flow::Jump(target) => target,
        };
    }

    /// Execute every instruction of `block` and leave pc at its successor.
    ///
    /// Execution stops early at the first fault, with pc left at the
    /// faulting instruction.
    pub fn interpret(&mut self, block: &BasicBlock) {
        let mut next = block.start;
        for (pc, inst) in block.iter() {
            let flow = self.step(pc, inst);
            if self.fault.is_some() {
                return;
            }
            next = match flow {
                Flow::Next => pc.wrapping_add(inst.size()),
                Flow::Jump(target) => target,
            };
        }
        self.pc = next;
    }
}
