//! Opcode families and the sub-operations selected by func3/func7.

use strum::{EnumIter, IntoStaticStr};

/// RV32I major opcode (the low 7 bits of an instruction word).
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
#[repr(u8)]
pub enum Opcode {
    LOAD = 0b000_0011,
    MISC_MEM = 0b000_1111,
    OP_IMM = 0b001_0011,
    AUIPC = 0b001_0111,
    STORE = 0b010_0011,
    OP = 0b011_0011,
    LUI = 0b011_0111,
    BRANCH = 0b110_0011,
    JALR = 0b110_0111,
    JAL = 0b110_1111,
    SYSTEM = 0b111_0011,
}

impl Opcode {
    /// Map the low 7 bits of a word to its family, if RV32I defines one.
    pub fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits & 0x7f {
            0b000_0011 => Opcode::LOAD,
            0b000_1111 => Opcode::MISC_MEM,
            0b001_0011 => Opcode::OP_IMM,
            0b001_0111 => Opcode::AUIPC,
            0b010_0011 => Opcode::STORE,
            0b011_0011 => Opcode::OP,
            0b011_0111 => Opcode::LUI,
            0b110_0011 => Opcode::BRANCH,
            0b110_0111 => Opcode::JALR,
            0b110_1111 => Opcode::JAL,
            0b111_0011 => Opcode::SYSTEM,
            _ => return None,
        })
    }
}

/// ALU sub-operation shared by the register-immediate and register-register
/// families.
///
/// The discriminant is `func7[5] << 3 | func3`, so SUB and SRA live in the
/// same selector space as ADD and SRL, set apart by the high bit.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum AluOp {
    ADD = 0b0000,
    SLL = 0b0001,
    SLT = 0b0010,
    SLTU = 0b0011,
    XOR = 0b0100,
    SRL = 0b0101,
    OR = 0b0110,
    AND = 0b0111,
    SUB = 0b1000,
    SRA = 0b1101,
}

impl AluOp {
    /// Build the selector from func3 and the func7-derived bit.
    pub fn from_selector(func3: u32, alt: bool) -> Option<Self> {
        Some(match (alt as u32) << 3 | (func3 & 0b111) {
            0b0000 => AluOp::ADD,
            0b0001 => AluOp::SLL,
            0b0010 => AluOp::SLT,
            0b0011 => AluOp::SLTU,
            0b0100 => AluOp::XOR,
            0b0101 => AluOp::SRL,
            0b0110 => AluOp::OR,
            0b0111 => AluOp::AND,
            0b1000 => AluOp::SUB,
            0b1101 => AluOp::SRA,
            _ => return None,
        })
    }

    /// Apply the operation to two 32-bit operands.
    #[inline(always)]
    pub fn apply(self, b: u32, c: u32) -> u32 {
        match self {
            AluOp::ADD => b.wrapping_add(c),
            AluOp::SUB => b.wrapping_sub(c),
            AluOp::XOR => b ^ c,
            AluOp::OR => b | c,
            AluOp::AND => b & c,
            AluOp::SLL => b.wrapping_shl(c & 0x1f),
            AluOp::SRL => b.wrapping_shr(c & 0x1f),
            AluOp::SRA => (b as i32).wrapping_shr(c & 0x1f) as u32,
            AluOp::SLT => ((b as i32) < (c as i32)) as u32,
            AluOp::SLTU => (b < c) as u32,
        }
    }
}

/// Branch predicate, selected by func3.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum BranchOp {
    BEQ,
    BNE,
    BLT,
    BGE,
    BLTU,
    BGEU,
}

impl BranchOp {
    pub fn from_func3(func3: u32) -> Option<Self> {
        Some(match func3 & 0b111 {
            0b000 => BranchOp::BEQ,
            0b001 => BranchOp::BNE,
            0b100 => BranchOp::BLT,
            0b101 => BranchOp::BGE,
            0b110 => BranchOp::BLTU,
            0b111 => BranchOp::BGEU,
            _ => return None,
        })
    }

    /// Evaluate the predicate.
    #[inline(always)]
    pub fn taken(self, lhs: u32, rhs: u32) -> bool {
        match self {
            BranchOp::BEQ => lhs == rhs,
            BranchOp::BNE => lhs != rhs,
            BranchOp::BLT => (lhs as i32) < (rhs as i32),
            BranchOp::BGE => (lhs as i32) >= (rhs as i32),
            BranchOp::BLTU => lhs < rhs,
            BranchOp::BGEU => lhs >= rhs,
        }
    }
}

/// Load width and extension, selected by func3.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum LoadOp {
    LB,
    LH,
    LW,
    LBU,
    LHU,
}

impl LoadOp {
    pub fn from_func3(func3: u32) -> Option<Self> {
        Some(match func3 & 0b111 {
            0b000 => LoadOp::LB,
            0b001 => LoadOp::LH,
            0b010 => LoadOp::LW,
            0b100 => LoadOp::LBU,
            0b101 => LoadOp::LHU,
            _ => return None,
        })
    }

    /// Access width in bytes.
    pub fn width(self) -> usize {
        match self {
            LoadOp::LB | LoadOp::LBU => 1,
            LoadOp::LH | LoadOp::LHU => 2,
            LoadOp::LW => 4,
        }
    }
}

/// Store width, selected by func3.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum StoreOp {
    SB,
    SH,
    SW,
}

impl StoreOp {
    pub fn from_func3(func3: u32) -> Option<Self> {
        Some(match func3 & 0b111 {
            0b000 => StoreOp::SB,
            0b001 => StoreOp::SH,
            0b010 => StoreOp::SW,
            _ => return None,
        })
    }

    /// Access width in bytes.
    pub fn width(self) -> usize {
        match self {
            StoreOp::SB => 1,
            StoreOp::SH => 2,
            StoreOp::SW => 4,
        }
    }
}

/// Environment call or breakpoint.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum SystemOp {
    ECALL,
    EBREAK,
}
