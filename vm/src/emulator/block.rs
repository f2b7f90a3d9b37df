//! Basic Block Discovery
//!
//! A basic block is a straight-line run of decoded instructions that starts
//! at some address and ends with the first control-transfer instruction.
//! Blocks are decoded once and then served from [`BlockCache`].

use hashbrown::{hash_map::Entry, HashMap};
use tracing::debug;

use super::Memory;
use crate::{
    compiler::riscv::{decoder::decode, instruction::Instruction},
    config::ExecMode,
    constants::{BB_AVERAGE_SIZE, INSTRUCTION_SIZE},
    error::VmError,
};

/// A decoded basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Address of the first instruction.
    pub start: u32,
    /// Instructions in program order. Never empty.
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    /// Number of instructions in the block.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instructions paired with their addresses.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Instruction)> + '_ {
        self.instructions
            .iter()
            .enumerate()
            .map(|(i, inst)| (self.start.wrapping_add(i as u32 * INSTRUCTION_SIZE), inst))
    }

    /// Address of the last instruction.
    #[inline(always)]
    pub fn last_pc(&self) -> u32 {
        let tail = self.len().saturating_sub(1) as u32;
        self.start.wrapping_add(tail * INSTRUCTION_SIZE)
    }

    /// Address just past the last instruction.
    #[inline(always)]
    pub fn end(&self) -> u32 {
        self.last_pc().wrapping_add(INSTRUCTION_SIZE)
    }
}

/// Cache of decoded basic blocks keyed by start address.
///
/// The guest is assumed not to modify its own code, so entries are never
/// invalidated.
pub struct BlockCache {
    blocks: HashMap<u32, BasicBlock>,
    mode: ExecMode,
}

impl BlockCache {
    /// Create an empty cache. `mode` decides which instructions end a block.
    pub fn new(mode: ExecMode) -> Self {
        Self {
            blocks: HashMap::new(),
            mode,
        }
    }

    /// Return the block starting at `addr`, decoding it on first use.
    pub fn lookup(&mut self, memory: &Memory, addr: u32) -> Result<&BasicBlock, VmError> {
        match self.blocks.entry(addr) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let block = Self::build(memory, addr, self.mode)?;
                debug!(
                    start = format_args!("{addr:#x}"),
                    len = block.len(),
                    "cached basic block"
                );
                Ok(entry.insert(block))
            }
        }
    }

    /// Cached block at `addr`, without decoding.
    #[inline(always)]
    pub fn get(&self, addr: u32) -> Option<&BasicBlock> {
        self.blocks.get(&addr)
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn build(memory: &Memory, start: u32, mode: ExecMode) -> Result<BasicBlock, VmError> {
        let mut instructions = Vec::with_capacity(BB_AVERAGE_SIZE);
        let mut pc = start;
        loop {
            let word = memory.load::<u32>(pc).map_err(|err| VmError::MemoryFault {
                pc,
                addr: err.addr,
                width: err.width,
            })?;
            let inst = decode(word);
            instructions.push(inst);
            if inst.is_block_end(mode) {
                break;
            }
            pc = pc.wrapping_add(inst.size());
        }
        Ok(BasicBlock {
            start,
            instructions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::riscv::{opcode::SystemOp, register::Register},
        test_utils::{asm::*, memory_with},
    };

    #[test]
    fn test_block_ends_at_control_transfer() {
        let memory = memory_with(&[addi(1, 0, 1), addi(2, 0, 2), beq(1, 2, 8), addi(3, 0, 3)]);
        let mut cache = BlockCache::new(ExecMode::Interpreter);
        let block = cache.lookup(&memory, 0).unwrap();
        assert_eq!(block.len(), 3);
        assert_eq!(block.last_pc(), 8);
        assert_eq!(block.end(), 12);
        let pcs: Vec<u32> = block.iter().map(|(pc, _)| pc).collect();
        assert_eq!(pcs, vec![0, 4, 8]);
    }

    #[test]
    fn test_lookup_is_cached() {
        let memory = memory_with(&[addi(1, 0, 1), ecall()]);
        let mut cache = BlockCache::new(ExecMode::Jit);
        let first = cache.lookup(&memory, 0).unwrap().clone();
        assert_eq!(cache.len(), 1);
        let second = cache.lookup(&memory, 0).unwrap().clone();
        assert_eq!(cache.len(), 1);
        assert_eq!(first, second);
        assert_eq!(
            first.instructions[1],
            Instruction::System(SystemOp::ECALL)
        );
        assert!(cache.get(4).is_none());
    }

    #[test]
    fn test_auipc_ends_block_only_for_jit() {
        let words = [auipc(1, 1), addi(1, 1, 4), ebreak()];
        let memory = memory_with(&words);

        let mut interp = BlockCache::new(ExecMode::Interpreter);
        assert_eq!(interp.lookup(&memory, 0).unwrap().len(), 3);

        let mut jit = BlockCache::new(ExecMode::Jit);
        let block = jit.lookup(&memory, 0).unwrap();
        assert_eq!(block.len(), 1);
        assert_eq!(
            block.instructions[0],
            Instruction::Auipc {
                rd: Register::X1,
                imm: 0x1000
            }
        );
    }

    #[test]
    fn test_fetch_past_memory_end() {
        let mut memory = Memory::new(8);
        memory.load_words(0, &[addi(1, 0, 1), addi(1, 1, 1)]).unwrap();
        let mut cache = BlockCache::new(ExecMode::Interpreter);
        match cache.lookup(&memory, 0) {
            Err(VmError::MemoryFault { pc, addr, width }) => {
                assert_eq!((pc, addr, width), (8, 8, 4));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(cache.is_empty());
    }
}
