use strum::{EnumCount, EnumIter, FromRepr};

/// A general-purpose register of the RV32I register file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount, FromRepr,
)]
#[repr(u8)]
pub enum Register {
    X0 = 0,
    X1 = 1,
    X2 = 2,
    X3 = 3,
    X4 = 4,
    X5 = 5,
    X6 = 6,
    X7 = 7,
    X8 = 8,
    X9 = 9,
    X10 = 10,
    X11 = 11,
    X12 = 12,
    X13 = 13,
    X14 = 14,
    X15 = 15,
    X16 = 16,
    X17 = 17,
    X18 = 18,
    X19 = 19,
    X20 = 20,
    X21 = 21,
    X22 = 22,
    X23 = 23,
    X24 = 24,
    X25 = 25,
    X26 = 26,
    X27 = 27,
    X28 = 28,
    X29 = 29,
    X30 = 30,
    X31 = 31,
}

impl Register {
    /// Hard-wired zero.
    pub const ZERO: Register = Register::X0;
    /// Return address.
    pub const RA: Register = Register::X1;
    /// Stack pointer.
    pub const SP: Register = Register::X2;
    /// First argument and syscall return value.
    pub const A0: Register = Register::X10;
    pub const A1: Register = Register::X11;
    pub const A2: Register = Register::X12;
    /// Syscall number.
    pub const A7: Register = Register::X17;

    /// Build a register from the low five bits of an encoding field.
    #[inline(always)]
    pub fn from_field(field: u32) -> Self {
        Self::from_repr((field & 0x1f) as u8).unwrap_or(Register::X0)
    }

    /// Index into the register file.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub const fn is_zero(self) -> bool {
        matches!(self, Register::X0)
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.index())
    }
}
