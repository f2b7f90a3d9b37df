//! Test helpers: a tiny RV32I assembler and program runners.

use std::{
    io,
    sync::{Arc, Mutex},
};

use crate::{
    config::EmulatorConfig,
    emulator::{Cpu, Emulator, Memory},
    error::VmError,
};

/// Encoders for the RV32I base formats, one helper per mnemonic.
///
/// Operands follow assembly order (`sw rs2, imm(rs1)` is `sw(rs2, rs1, imm)`).
pub mod asm {
    const LOAD: u32 = 0b000_0011;
    const OP_IMM: u32 = 0b001_0011;
    const AUIPC: u32 = 0b001_0111;
    const STORE: u32 = 0b010_0011;
    const OP: u32 = 0b011_0011;
    const LUI: u32 = 0b011_0111;
    const BRANCH: u32 = 0b110_0011;
    const JALR: u32 = 0b110_0111;
    const JAL: u32 = 0b110_1111;
    const SYSTEM: u32 = 0b111_0011;

    fn r_type(func7: u32, rs2: u32, rs1: u32, func3: u32, rd: u32, opcode: u32) -> u32 {
        func7 << 25 | rs2 << 20 | rs1 << 15 | func3 << 12 | rd << 7 | opcode
    }

    fn i_type(imm: i32, rs1: u32, func3: u32, rd: u32, opcode: u32) -> u32 {
        ((imm as u32) & 0xfff) << 20 | rs1 << 15 | func3 << 12 | rd << 7 | opcode
    }

    fn s_type(imm: i32, rs2: u32, rs1: u32, func3: u32) -> u32 {
        let imm = imm as u32;
        ((imm >> 5) & 0x7f) << 25 | rs2 << 20 | rs1 << 15 | func3 << 12 | (imm & 0x1f) << 7 | STORE
    }

    fn b_type(imm: i32, rs2: u32, rs1: u32, func3: u32) -> u32 {
        let imm = imm as u32;
        ((imm >> 12) & 1) << 31
            | ((imm >> 5) & 0x3f) << 25
            | rs2 << 20
            | rs1 << 15
            | func3 << 12
            | ((imm >> 1) & 0xf) << 8
            | ((imm >> 11) & 1) << 7
            | BRANCH
    }

    fn u_type(imm20: u32, rd: u32, opcode: u32) -> u32 {
        (imm20 & 0xf_ffff) << 12 | rd << 7 | opcode
    }

    fn j_type(imm: i32, rd: u32) -> u32 {
        let imm = imm as u32;
        ((imm >> 20) & 1) << 31
            | ((imm >> 1) & 0x3ff) << 21
            | ((imm >> 11) & 1) << 20
            | ((imm >> 12) & 0xff) << 12
            | rd << 7
            | JAL
    }

    pub fn lui(rd: u32, imm20: u32) -> u32 {
        u_type(imm20, rd, LUI)
    }
    pub fn auipc(rd: u32, imm20: u32) -> u32 {
        u_type(imm20, rd, AUIPC)
    }
    pub fn jal(rd: u32, imm: i32) -> u32 {
        j_type(imm, rd)
    }
    pub fn jalr(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b000, rd, JALR)
    }

    pub fn beq(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(imm, rs2, rs1, 0b000)
    }
    pub fn bne(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(imm, rs2, rs1, 0b001)
    }
    pub fn blt(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(imm, rs2, rs1, 0b100)
    }
    pub fn bge(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(imm, rs2, rs1, 0b101)
    }
    pub fn bltu(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(imm, rs2, rs1, 0b110)
    }
    pub fn bgeu(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(imm, rs2, rs1, 0b111)
    }

    pub fn lb(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b000, rd, LOAD)
    }
    pub fn lh(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b001, rd, LOAD)
    }
    pub fn lw(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b010, rd, LOAD)
    }
    pub fn lbu(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b100, rd, LOAD)
    }
    pub fn lhu(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b101, rd, LOAD)
    }

    pub fn sb(rs2: u32, rs1: u32, imm: i32) -> u32 {
        s_type(imm, rs2, rs1, 0b000)
    }
    pub fn sh(rs2: u32, rs1: u32, imm: i32) -> u32 {
        s_type(imm, rs2, rs1, 0b001)
    }
    pub fn sw(rs2: u32, rs1: u32, imm: i32) -> u32 {
        s_type(imm, rs2, rs1, 0b010)
    }

    pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b000, rd, OP_IMM)
    }
    pub fn slti(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b010, rd, OP_IMM)
    }
    pub fn sltiu(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b011, rd, OP_IMM)
    }
    pub fn xori(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b100, rd, OP_IMM)
    }
    pub fn ori(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b110, rd, OP_IMM)
    }
    pub fn andi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b111, rd, OP_IMM)
    }
    pub fn slli(rd: u32, rs1: u32, shamt: u32) -> u32 {
        i_type((shamt & 0x1f) as i32, rs1, 0b001, rd, OP_IMM)
    }
    pub fn srli(rd: u32, rs1: u32, shamt: u32) -> u32 {
        i_type((shamt & 0x1f) as i32, rs1, 0b101, rd, OP_IMM)
    }
    pub fn srai(rd: u32, rs1: u32, shamt: u32) -> u32 {
        i_type((0x400 | (shamt & 0x1f)) as i32, rs1, 0b101, rd, OP_IMM)
    }

    pub fn add(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b000, rd, OP)
    }
    pub fn sub(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0b010_0000, rs2, rs1, 0b000, rd, OP)
    }
    pub fn sll(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b001, rd, OP)
    }
    pub fn slt(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b010, rd, OP)
    }
    pub fn sltu(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b011, rd, OP)
    }
    pub fn xor(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b100, rd, OP)
    }
    pub fn srl(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b101, rd, OP)
    }
    pub fn sra(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0b010_0000, rs2, rs1, 0b101, rd, OP)
    }
    pub fn or(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b110, rd, OP)
    }
    pub fn and(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b111, rd, OP)
    }

    pub fn fence() -> u32 {
        0x0ff0_000f
    }
    pub fn ecall() -> u32 {
        SYSTEM
    }
    pub fn ebreak() -> u32 {
        1 << 20 | SYSTEM
    }
}

/// Memory size used by tests; large enough for the default stack pointer.
pub const TEST_MEMORY_SIZE: usize = 0x10_0000;

/// Fresh test memory with `words` placed at address 0.
pub fn memory_with(words: &[u32]) -> Memory {
    let mut memory = Memory::new(TEST_MEMORY_SIZE);
    memory
        .load_words(0, words)
        .expect("program fits in test memory");
    memory
}

/// Recursive Fibonacci: `fib(n)` is left in a0, then the program exits
/// through the exit syscall.
pub fn fib_program(n: i32) -> Vec<u32> {
    use asm::*;
    vec![
        addi(10, 0, n),   // 0x00: a0 = n
        jal(1, 0x0c),     // 0x04: call fib
        addi(17, 0, 93),  // 0x08: a7 = exit
        ecall(),          // 0x0c
        addi(5, 0, 2),    // 0x10: fib: t0 = 2
        blt(10, 5, 0x38), // 0x14: n < 2 -> return n
        addi(2, 2, -12),  // 0x18
        sw(1, 2, 8),      // 0x1c
        sw(10, 2, 4),     // 0x20
        addi(10, 10, -1), // 0x24
        jal(1, -0x18),    // 0x28: fib(n - 1)
        sw(10, 2, 0),     // 0x2c
        lw(10, 2, 4),     // 0x30
        addi(10, 10, -2), // 0x34
        jal(1, -0x28),    // 0x38: fib(n - 2)
        lw(6, 2, 0),      // 0x3c
        add(10, 10, 6),   // 0x40
        lw(1, 2, 8),      // 0x44
        addi(2, 2, 12),   // 0x48
        jalr(0, 1, 0),    // 0x4c: return
    ]
}

/// Run `words` from address 0 under `config` and hand back the result
/// together with the final registers, pc and memory.
pub fn run_program(
    words: &[u32],
    config: EmulatorConfig,
) -> (Result<(), VmError>, [u32; 32], u32, Memory) {
    let mut memory = memory_with(words);
    let (result, regs, pc) = {
        let mut cpu = Cpu::configured(&mut memory, 0, &config);
        let mut emulator = Emulator::new(config).expect("emulator");
        let result = emulator.run(&mut cpu);
        (result, *cpu.registers(), cpu.pc())
    };
    (result, regs, pc, memory)
}

/// Run `f` with a trace-level subscriber installed for this thread and
/// return its result together with everything that was logged.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || LogSink(sink.clone()))
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.lock().expect("log buffer")).into_owned();
    (result, logs)
}

struct LogSink(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
