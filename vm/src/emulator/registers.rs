use super::Cpu;
use crate::compiler::riscv::register::Register;

impl Cpu<'_> {
    // ========================================================================
    // Register Operations
    // ========================================================================

    /// Read a register value (x0 always reads as zero).
    #[inline(always)]
    pub fn reg(&self, reg: Register) -> u32 {
        if reg.is_zero() {
            0
        } else {
            self.regs[reg.index()]
        }
    }

    /// Write to a register (writes to x0 are ignored).
    #[inline(always)]
    pub fn set_reg(&mut self, reg: Register, value: u32) {
        if !reg.is_zero() {
            self.regs[reg.index()] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::Memory;
    use strum::IntoEnumIterator;

    #[test]
    fn test_x0_is_hardwired() {
        let mut memory = Memory::new(16);
        let mut cpu = Cpu::new(&mut memory, 0);
        for reg in Register::iter() {
            cpu.set_reg(reg, 0x1234_5678);
            cpu.set_reg(Register::X0, reg.index() as u32 + 1);
            assert_eq!(cpu.reg(Register::X0), 0);
            assert_eq!(cpu.registers()[0], 0);
        }
        assert_eq!(cpu.reg(Register::X31), 0x1234_5678);
    }
}
