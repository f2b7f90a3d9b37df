//! RV32I instruction decoder
//!
//! Turns a raw 32-bit word into an [`Instruction`]. Decoding is a pure
//! function of the word; words RV32I does not define become
//! [`Instruction::Unsupported`].

use super::{
    instruction::Instruction,
    opcode::{AluOp, BranchOp, LoadOp, Opcode, StoreOp, SystemOp},
    register::Register,
};

/// Decode a 32-bit RISC-V instruction word.
pub fn decode(word: u32) -> Instruction {
    let rd = Register::from_field(word >> 7);
    let rs1 = Register::from_field(word >> 15);
    let rs2 = Register::from_field(word >> 20);
    let func3 = (word >> 12) & 0b111;
    let alt = (word >> 30) & 1 == 1;

    let Some(opcode) = Opcode::from_bits(word) else {
        return Instruction::Unsupported { word };
    };

    let decoded = match opcode {
        Opcode::LUI => Some(Instruction::Lui {
            rd,
            imm: imm_u(word),
        }),
        Opcode::AUIPC => Some(Instruction::Auipc {
            rd,
            imm: imm_u(word),
        }),
        Opcode::JAL => Some(Instruction::Jal {
            rd,
            imm: imm_j(word),
        }),
        Opcode::JALR => Some(Instruction::Jalr {
            rd,
            rs1,
            imm: imm_i(word),
        }),
        Opcode::BRANCH => BranchOp::from_func3(func3).map(|op| Instruction::Branch {
            op,
            rs1,
            rs2,
            imm: imm_b(word),
        }),
        Opcode::LOAD => LoadOp::from_func3(func3).map(|op| Instruction::Load {
            op,
            rd,
            rs1,
            imm: imm_i(word),
        }),
        Opcode::STORE => StoreOp::from_func3(func3).map(|op| Instruction::Store {
            op,
            rs1,
            rs2,
            imm: imm_s(word),
        }),
        Opcode::OP_IMM => {
            // SRLI and SRAI share func3; bit 30 (shamt bit 10) selects SRAI.
            let alt = func3 == 0b101 && alt;
            AluOp::from_selector(func3, alt).map(|op| Instruction::Imm {
                op,
                rd,
                rs1,
                imm: imm_i(word),
            })
        }
        Opcode::OP => {
            let func7 = word >> 25;
            if func7 == 0 || func7 == 0b010_0000 {
                AluOp::from_selector(func3, alt).map(|op| Instruction::Op { op, rd, rs1, rs2 })
            } else {
                None
            }
        }
        Opcode::MISC_MEM => Some(Instruction::Fence),
        Opcode::SYSTEM => Some(Instruction::System(if imm_i(word) == 0 {
            SystemOp::ECALL
        } else {
            SystemOp::EBREAK
        })),
    };

    decoded.unwrap_or(Instruction::Unsupported { word })
}

/// I-type immediate: `inst[31:20]`, sign-extended.
#[inline(always)]
pub fn imm_i(word: u32) -> i32 {
    (word as i32) >> 20
}

/// S-type immediate: `inst[31:25] | inst[11:7]`, sign-extended.
#[inline(always)]
pub fn imm_s(word: u32) -> i32 {
    (((word as i32) >> 20) & !0x1f) | ((word >> 7) & 0x1f) as i32
}

/// B-type immediate: `inst[31] | inst[7] | inst[30:25] | inst[11:8] | 0`, sign-extended.
#[inline(always)]
pub fn imm_b(word: u32) -> i32 {
    (((word as i32) >> 20) & !0xfff)
        | ((word << 4) & 0x800) as i32
        | ((word >> 20) & 0x7e0) as i32
        | ((word >> 7) & 0x1e) as i32
}

/// U-type immediate: `inst[31:12]` kept in place.
#[inline(always)]
pub fn imm_u(word: u32) -> u32 {
    word & !0xfff
}

/// J-type immediate: `inst[31] | inst[19:12] | inst[20] | inst[30:21] | 0`, sign-extended.
#[inline(always)]
pub fn imm_j(word: u32) -> i32 {
    (((word as i32) >> 11) & !0xf_ffff)
        | (word & 0xf_f000) as i32
        | ((word >> 9) & 0x800) as i32
        | ((word >> 20) & 0x7e0) as i32
        | ((word >> 20) & 0x1e) as i32
}
