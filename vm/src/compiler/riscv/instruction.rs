use std::fmt;

use super::{
    opcode::{AluOp, BranchOp, LoadOp, Opcode, StoreOp, SystemOp},
    register::Register,
};
use crate::{config::ExecMode, constants::INSTRUCTION_SIZE};

/// A decoded RV32I instruction.
///
/// Each variant is one opcode family. Immediates are already sign-extended;
/// the U-type immediate of `Lui`/`Auipc` is kept in place (low 12 bits zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Lui { rd: Register, imm: u32 },
    Auipc { rd: Register, imm: u32 },
    Jal { rd: Register, imm: i32 },
    Jalr { rd: Register, rs1: Register, imm: i32 },
    Branch { op: BranchOp, rs1: Register, rs2: Register, imm: i32 },
    Load { op: LoadOp, rd: Register, rs1: Register, imm: i32 },
    Store { op: StoreOp, rs1: Register, rs2: Register, imm: i32 },
    Imm { op: AluOp, rd: Register, rs1: Register, imm: i32 },
    Op { op: AluOp, rd: Register, rs1: Register, rs2: Register },
    Fence,
    System(SystemOp),
    /// Any word RV32I does not define.
    Unsupported { word: u32 },
}

impl Instruction {
    /// Opcode family, or `None` for unsupported words.
    pub fn family(&self) -> Option<Opcode> {
        Some(match self {
            Instruction::Lui { .. } => Opcode::LUI,
            Instruction::Auipc { .. } => Opcode::AUIPC,
            Instruction::Jal { .. } => Opcode::JAL,
            Instruction::Jalr { .. } => Opcode::JALR,
            Instruction::Branch { .. } => Opcode::BRANCH,
            Instruction::Load { .. } => Opcode::LOAD,
            Instruction::Store { .. } => Opcode::STORE,
            Instruction::Imm { .. } => Opcode::OP_IMM,
            Instruction::Op { .. } => Opcode::OP,
            Instruction::Fence => Opcode::MISC_MEM,
            Instruction::System(_) => Opcode::SYSTEM,
            Instruction::Unsupported { .. } => return None,
        })
    }

    /// Encoded size in bytes.
    #[inline(always)]
    pub const fn size(&self) -> u32 {
        INSTRUCTION_SIZE
    }

    /// Whether this instruction closes a basic block.
    ///
    /// AUIPC also ends blocks that are built for native translation.
    pub fn is_block_end(&self, mode: ExecMode) -> bool {
        match self {
            Instruction::Branch { .. }
            | Instruction::Jal { .. }
            | Instruction::Jalr { .. }
            | Instruction::System(_) => true,
            Instruction::Auipc { .. } => mode == ExecMode::Jit,
            _ => false,
        }
    }

    /// Destination register, if the instruction writes one.
    pub fn rd(&self) -> Option<Register> {
        match *self {
            Instruction::Lui { rd, .. }
            | Instruction::Auipc { rd, .. }
            | Instruction::Jal { rd, .. }
            | Instruction::Jalr { rd, .. }
            | Instruction::Load { rd, .. }
            | Instruction::Imm { rd, .. }
            | Instruction::Op { rd, .. } => Some(rd),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Lui { rd, imm } => write!(f, "lui {rd}, {:#x}", imm >> 12),
            Instruction::Auipc { rd, imm } => write!(f, "auipc {rd}, {:#x}", imm >> 12),
            Instruction::Jal { rd, imm } => write!(f, "jal {rd}, {imm}"),
            Instruction::Jalr { rd, rs1, imm } => write!(f, "jalr {rd}, {imm}({rs1})"),
            Instruction::Branch { op, rs1, rs2, imm } => {
                write!(f, "{} {rs1}, {rs2}, {imm}", <&str>::from(op))
            }
            Instruction::Load { op, rd, rs1, imm } => {
                write!(f, "{} {rd}, {imm}({rs1})", <&str>::from(op))
            }
            Instruction::Store { op, rs1, rs2, imm } => {
                write!(f, "{} {rs2}, {imm}({rs1})", <&str>::from(op))
            }
            Instruction::Imm { op, rd, rs1, imm } => match op {
                AluOp::SLL | AluOp::SRL | AluOp::SRA => {
                    write!(f, "{}i {rd}, {rs1}, {}", <&str>::from(op), imm & 0x1f)
                }
                AluOp::SLTU => write!(f, "sltiu {rd}, {rs1}, {imm}"),
                _ => write!(f, "{}i {rd}, {rs1}, {imm}", <&str>::from(op)),
            },
            Instruction::Op { op, rd, rs1, rs2 } => {
                write!(f, "{} {rd}, {rs1}, {rs2}", <&str>::from(op))
            }
            Instruction::Fence => write!(f, "fence"),
            Instruction::System(op) => write!(f, "{}", <&str>::from(op)),
            Instruction::Unsupported { word } => write!(f, "unsupported {word:#010x}"),
        }
    }
}
