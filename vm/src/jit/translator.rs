//! Lowering of a basic block to Cranelift IR.
//!
//! A block becomes one function `fn(&mut Cpu)`. Guest registers live in the
//! CPU struct and are loaded and stored at their field offset on every use.
//! Every instruction address is known at translation time, so pc-relative
//! values are emitted as constants. Before returning, the function stores
//! the successor pc; call-outs that fault set `done` and the function
//! returns right after them.

use cranelift_codegen::ir::{
    condcodes::IntCC, types, Block, FuncRef, InstBuilder, MemFlags, Value,
};
use cranelift_frontend::FunctionBuilder;
use strum::IntoEnumIterator;
use tracing::warn;

use super::{helpers::Helper, DONE_OFFSET, PC_OFFSET, REGS_OFFSET};
use crate::{
    compiler::riscv::{
        instruction::Instruction,
        opcode::{AluOp, BranchOp, LoadOp, StoreOp, SystemOp},
        register::Register,
    },
    config::UnsupportedPolicy,
    emulator::{BasicBlock, SyscallCode},
};

pub(crate) struct Translator<'a> {
    builder: FunctionBuilder<'a>,
    /// The `&mut Cpu` parameter.
    cpu: Value,
    /// Shared exit taken after a faulting call-out.
    bail: Block,
    helpers: Vec<FuncRef>,
    unsupported: UnsupportedPolicy,
}

impl<'a> Translator<'a> {
    /// Start the function body. `helpers` are the imported call-outs,
    /// indexed by [`Helper`].
    pub(crate) fn new(
        mut builder: FunctionBuilder<'a>,
        helpers: Vec<FuncRef>,
        unsupported: UnsupportedPolicy,
    ) -> Self {
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let cpu = builder.block_params(entry)[0];
        let bail = builder.create_block();

        Self {
            builder,
            cpu,
            bail,
            helpers,
            unsupported,
        }
    }

    /// Lower every instruction of `block`.
    pub(crate) fn lower_block(&mut self, block: &BasicBlock) {
        for (pc, inst) in block.iter() {
            if !self.lower(pc, inst) {
                return;
            }
        }
        // Blocks cut at AUIPC fall through to the next address.
        self.store_pc_const(block.end());
        self.builder.ins().return_(&[]);
    }

    /// Emit the shared exit and seal the function.
    pub(crate) fn finish(mut self) {
        self.builder.switch_to_block(self.bail);
        self.builder.ins().return_(&[]);
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }

    // ========================================================================
    // Guest State Access
    // ========================================================================

    fn reg(&mut self, reg: Register) -> Value {
        if reg.is_zero() {
            return self.builder.ins().iconst(types::I32, 0);
        }
        self.builder.ins().load(
            types::I32,
            MemFlags::trusted(),
            self.cpu,
            REGS_OFFSET + 4 * reg.index() as i32,
        )
    }

    fn set_reg(&mut self, reg: Register, value: Value) {
        if reg.is_zero() {
            return;
        }
        self.builder.ins().store(
            MemFlags::trusted(),
            value,
            self.cpu,
            REGS_OFFSET + 4 * reg.index() as i32,
        );
    }

    fn store_pc(&mut self, value: Value) {
        self.builder
            .ins()
            .store(MemFlags::trusted(), value, self.cpu, PC_OFFSET);
    }

    fn store_pc_const(&mut self, pc: u32) {
        let value = self.iconst(pc);
        self.store_pc(value);
    }

    fn iconst(&mut self, value: u32) -> Value {
        self.builder.ins().iconst(types::I32, value as i32 as i64)
    }

    // ========================================================================
    // Call-outs
    // ========================================================================

    fn call(&mut self, helper: Helper, args: &[Value]) -> Option<Value> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(self.cpu);
        full.extend_from_slice(args);
        let inst = self
            .builder
            .ins()
            .call(self.helpers[helper as usize], &full);
        self.builder.inst_results(inst).first().copied()
    }

    /// Return from the function if the last call-out stopped the CPU.
    fn bail_if_done(&mut self) {
        let done = self
            .builder
            .ins()
            .load(types::I8, MemFlags::trusted(), self.cpu, DONE_OFFSET);
        let next = self.builder.create_block();
        self.builder.ins().brif(done, self.bail, &[], next, &[]);
        self.builder.switch_to_block(next);
    }

    // ========================================================================
    // Instructions
    // ========================================================================

    /// Lower one instruction. Returns false once the function has returned.
    fn lower(&mut self, pc: u32, inst: &Instruction) -> bool {
        let next_pc = pc.wrapping_add(inst.size());
        match *inst {
            Instruction::Lui { rd, imm } => {
                if !rd.is_zero() {
                    let value = self.iconst(imm);
                    self.set_reg(rd, value);
                }
            }
            Instruction::Auipc { rd, imm } => {
                if !rd.is_zero() {
                    let value = self.iconst(pc.wrapping_add(imm));
                    self.set_reg(rd, value);
                }
            }
            Instruction::Jal { rd, imm } => {
                let link = self.iconst(next_pc);
                self.set_reg(rd, link);
                self.store_pc_const(pc.wrapping_add(imm as u32));
                self.builder.ins().return_(&[]);
                return false;
            }
            Instruction::Jalr { rd, rs1, imm } => {
                let base = self.reg(rs1);
                let target = self.builder.ins().iadd_imm(base, imm as i64);
                let target = self.builder.ins().band_imm(target, !1i64);
                let link = self.iconst(next_pc);
                self.set_reg(rd, link);
                self.store_pc(target);
                self.builder.ins().return_(&[]);
                return false;
            }
            Instruction::Branch { op, rs1, rs2, imm } => {
                self.lower_branch(op, rs1, rs2, pc.wrapping_add(imm as u32), next_pc);
                return false;
            }
            Instruction::Load { op, rd, rs1, imm } => {
                let base = self.reg(rs1);
                let addr = self.builder.ins().iadd_imm(base, imm as i64);
                let pc = self.iconst(pc);
                let (helper, mask): (Helper, Option<i64>) = match op {
                    LoadOp::LB => (Helper::LoadI8, None),
                    LoadOp::LH => (Helper::LoadI16, None),
                    LoadOp::LW => (Helper::LoadI32, None),
                    LoadOp::LBU => (Helper::LoadI8, Some(0xff)),
                    LoadOp::LHU => (Helper::LoadI16, Some(0xffff)),
                };
                let loaded = self.call(helper, &[addr, pc]);
                self.bail_if_done();
                if let Some(mut value) = loaded {
                    if let Some(mask) = mask {
                        value = self.builder.ins().band_imm(value, mask);
                    }
                    self.set_reg(rd, value);
                }
            }
            Instruction::Store { op, rs1, rs2, imm } => {
                let base = self.reg(rs1);
                let addr = self.builder.ins().iadd_imm(base, imm as i64);
                let value = self.reg(rs2);
                let pc = self.iconst(pc);
                let helper = match op {
                    StoreOp::SB => Helper::StoreU8,
                    StoreOp::SH => Helper::StoreU16,
                    StoreOp::SW => Helper::StoreU32,
                };
                self.call(helper, &[addr, value, pc]);
                self.bail_if_done();
            }
            Instruction::Imm { op, rd, rs1, imm } => {
                if !rd.is_zero() {
                    let lhs = self.reg(rs1);
                    let rhs = self.iconst(imm as u32);
                    let value = self.alu(op, lhs, rhs);
                    self.set_reg(rd, value);
                }
            }
            Instruction::Op { op, rd, rs1, rs2 } => {
                if !rd.is_zero() {
                    let lhs = self.reg(rs1);
                    let rhs = self.reg(rs2);
                    let value = self.alu(op, lhs, rhs);
                    self.set_reg(rd, value);
                }
            }
            Instruction::Fence => {}
            Instruction::System(SystemOp::ECALL) => {
                self.lower_ecall(pc, next_pc);
                return false;
            }
            Instruction::System(SystemOp::EBREAK) => {
                let one = self.builder.ins().iconst(types::I8, 1);
                self.builder
                    .ins()
                    .store(MemFlags::trusted(), one, self.cpu, DONE_OFFSET);
                self.store_pc_const(next_pc);
                self.builder.ins().return_(&[]);
                return false;
            }
            // Under `Skip` the warning is logged once, when the block is
            // compiled. Native runs of the block skip the word silently,
            // unlike the interpreter which warns on every execution.
            Instruction::Unsupported { word } => match self.unsupported {
                UnsupportedPolicy::Skip => {
                    warn!(
                        pc = format_args!("{pc:#x}"),
                        word = format_args!("{word:#010x}"),
                        "unsupported instruction compiled as a no-op; native runs skip it without warning"
                    );
                }
                UnsupportedPolicy::Fault => {
                    let word = self.iconst(word);
                    let pc = self.iconst(pc);
                    self.call(Helper::Illegal, &[word, pc]);
                    self.builder.ins().return_(&[]);
                    return false;
                }
            },
        }
        true
    }

    fn alu(&mut self, op: AluOp, lhs: Value, rhs: Value) -> Value {
        match op {
            AluOp::ADD => self.builder.ins().iadd(lhs, rhs),
            AluOp::SUB => self.builder.ins().isub(lhs, rhs),
            AluOp::XOR => self.builder.ins().bxor(lhs, rhs),
            AluOp::OR => self.builder.ins().bor(lhs, rhs),
            AluOp::AND => self.builder.ins().band(lhs, rhs),
            // Shift amounts are taken modulo the type width, as in RV32I.
            AluOp::SLL => self.builder.ins().ishl(lhs, rhs),
            AluOp::SRL => self.builder.ins().ushr(lhs, rhs),
            AluOp::SRA => self.builder.ins().sshr(lhs, rhs),
            AluOp::SLT => self.set_if(IntCC::SignedLessThan, lhs, rhs),
            AluOp::SLTU => self.set_if(IntCC::UnsignedLessThan, lhs, rhs),
        }
    }

    fn set_if(&mut self, cc: IntCC, lhs: Value, rhs: Value) -> Value {
        let flag = self.builder.ins().icmp(cc, lhs, rhs);
        self.builder.ins().uextend(types::I32, flag)
    }

    fn lower_branch(
        &mut self,
        op: BranchOp,
        rs1: Register,
        rs2: Register,
        taken_pc: u32,
        next_pc: u32,
    ) {
        let cc = match op {
            BranchOp::BEQ => IntCC::Equal,
            BranchOp::BNE => IntCC::NotEqual,
            BranchOp::BLT => IntCC::SignedLessThan,
            BranchOp::BGE => IntCC::SignedGreaterThanOrEqual,
            BranchOp::BLTU => IntCC::UnsignedLessThan,
            BranchOp::BGEU => IntCC::UnsignedGreaterThanOrEqual,
        };
        let lhs = self.reg(rs1);
        let rhs = self.reg(rs2);
        let cond = self.builder.ins().icmp(cc, lhs, rhs);

        let taken = self.builder.create_block();
        let fallthrough = self.builder.create_block();
        self.builder.ins().brif(cond, taken, &[], fallthrough, &[]);

        for (block, target) in [(taken, taken_pc), (fallthrough, next_pc)] {
            self.builder.switch_to_block(block);
            self.store_pc_const(target);
            self.builder.ins().return_(&[]);
        }
    }

    /// Dispatch on a7 to the matching syscall helper. Unknown numbers do
    /// nothing.
    fn lower_ecall(&mut self, pc: u32, next_pc: u32) {
        self.store_pc_const(next_pc);
        let number = self.reg(Register::A7);
        let pc = self.iconst(pc);
        let join = self.builder.create_block();

        for code in SyscallCode::iter() {
            let matched = self
                .builder
                .ins()
                .icmp_imm(IntCC::Equal, number, code as i64);
            let call = self.builder.create_block();
            let next = self.builder.create_block();
            self.builder.ins().brif(matched, call, &[], next, &[]);

            self.builder.switch_to_block(call);
            self.call(Helper::for_syscall(code), &[pc]);
            self.builder.ins().jump(join, &[]);

            self.builder.switch_to_block(next);
        }
        self.builder.ins().jump(join, &[]);

        self.builder.switch_to_block(join);
        self.builder.ins().return_(&[]);
    }
}
