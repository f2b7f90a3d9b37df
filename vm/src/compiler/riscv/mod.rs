//! RV32I instruction model and decoder.

pub mod decoder;
pub mod instruction;
pub mod opcode;
pub mod register;
