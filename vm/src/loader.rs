//! Program image loading.
//!
//! Only the executable segment of an ELF file is used: its bytes are copied
//! to guest address 0 and the entry point is rebased accordingly.

use std::path::Path;

use elf::{
    abi::{EM_RISCV, PF_R, PF_X, PT_LOAD},
    endian::LittleEndian,
    file::Class,
    ElfBytes,
};
use thiserror::Error;
use tracing::debug;

use crate::{constants::INSTRUCTION_SIZE, emulator::Memory};

/// Errors raised while loading a program image.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read program: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse ELF: {0}")]
    Parse(#[from] elf::ParseError),

    #[error("ELF must be 32-bit")]
    NotElf32,

    #[error("ELF must target RISC-V (found machine {0})")]
    NotRiscv(u16),

    #[error("ELF has no readable and executable PT_LOAD segment")]
    NoExecutableSegment,

    #[error("program of {size} bytes does not fit in {capacity} bytes of memory")]
    TooLarge { size: usize, capacity: usize },
}

/// Placement of a loaded program in guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramImage {
    /// Number of instruction words copied to address 0.
    pub instruction_count: usize,
    /// Initial pc: the ELF entry point relative to the segment base.
    pub entry_offset: u32,
}

/// Load the executable segment of an RV32 ELF file.
pub fn load_elf_file(path: impl AsRef<Path>, memory: &mut Memory) -> Result<ProgramImage, LoadError> {
    let bytes = std::fs::read(path)?;
    load_elf(&bytes, memory)
}

/// Load the executable segment of an in-memory RV32 ELF image.
pub fn load_elf(bytes: &[u8], memory: &mut Memory) -> Result<ProgramImage, LoadError> {
    let elf = ElfBytes::<LittleEndian>::minimal_parse(bytes)?;

    if elf.ehdr.class != Class::ELF32 {
        return Err(LoadError::NotElf32);
    }
    if elf.ehdr.e_machine != EM_RISCV {
        return Err(LoadError::NotRiscv(elf.ehdr.e_machine));
    }

    let segment = elf
        .segments()
        .and_then(|segments| {
            segments
                .iter()
                .find(|phdr| phdr.p_type == PT_LOAD && phdr.p_flags == PF_R | PF_X)
        })
        .ok_or(LoadError::NoExecutableSegment)?;
    let data = elf.segment_data(&segment)?;

    copy_to_memory(data, memory)?;
    let image = ProgramImage {
        instruction_count: data.len() / INSTRUCTION_SIZE as usize,
        entry_offset: elf.ehdr.e_entry.wrapping_sub(segment.p_vaddr) as u32,
    };
    debug!(
        vaddr = format_args!("{:#x}", segment.p_vaddr),
        instructions = image.instruction_count,
        entry = format_args!("{:#x}", image.entry_offset),
        "loaded ELF segment"
    );
    Ok(image)
}

/// Load a raw little-endian instruction stream at address 0.
pub fn load_raw(bytes: &[u8], memory: &mut Memory) -> Result<ProgramImage, LoadError> {
    copy_to_memory(bytes, memory)?;
    Ok(ProgramImage {
        instruction_count: bytes.len() / INSTRUCTION_SIZE as usize,
        entry_offset: 0,
    })
}

fn copy_to_memory(data: &[u8], memory: &mut Memory) -> Result<(), LoadError> {
    memory
        .write_bytes(0, data)
        .map_err(|_| LoadError::TooLarge {
            size: data.len(),
            capacity: memory.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::asm::*;

    const VADDR: u32 = 0x1_0000;

    /// A minimal ELF32 executable with one PT_LOAD segment holding `code`.
    fn elf32(machine: u16, flags: u32, entry: u32, code: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        out.extend_from_slice(&2u16.to_le_bytes()); // e_type: EXEC
        out.extend_from_slice(&machine.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes()); // e_version
        out.extend_from_slice(&entry.to_le_bytes());
        out.extend_from_slice(&52u32.to_le_bytes()); // e_phoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&52u16.to_le_bytes()); // e_ehsize
        out.extend_from_slice(&32u16.to_le_bytes()); // e_phentsize
        out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        out.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
        assert_eq!(out.len(), 52);

        let size = (code.len() * 4) as u32;
        for field in [PT_LOAD, 84, VADDR, VADDR, size, size, flags, 4] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        for word in code {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_load_elf() {
        let code = [addi(10, 0, 1), addi(10, 10, 2), addi(17, 0, 93), ecall()];
        let bytes = elf32(EM_RISCV, PF_R | PF_X, VADDR + 8, &code);
        let mut memory = Memory::new(1024);
        let image = load_elf(&bytes, &mut memory).unwrap();
        assert_eq!(
            image,
            ProgramImage {
                instruction_count: 4,
                entry_offset: 8
            }
        );
        assert_eq!(memory.load::<u32>(12), Ok(ecall()));
    }

    #[test]
    fn test_rejects_bad_images() {
        let code = [ecall()];
        let mut memory = Memory::new(1024);

        let x86 = elf32(62, PF_R | PF_X, VADDR, &code);
        assert!(matches!(load_elf(&x86, &mut memory), Err(LoadError::NotRiscv(62))));

        let writable = elf32(EM_RISCV, PF_R | 2, VADDR, &code);
        assert!(matches!(
            load_elf(&writable, &mut memory),
            Err(LoadError::NoExecutableSegment)
        ));

        assert!(matches!(
            load_elf(b"not an elf file at all", &mut memory),
            Err(LoadError::Parse(_))
        ));
    }

    #[test]
    fn test_image_larger_than_memory() {
        let code = [ecall(), ecall(), ecall()];
        let bytes = elf32(EM_RISCV, PF_R | PF_X, VADDR, &code);
        let mut memory = Memory::new(8);
        assert!(matches!(
            load_elf(&bytes, &mut memory),
            Err(LoadError::TooLarge {
                size: 12,
                capacity: 8
            })
        ));
    }

    #[test]
    fn test_load_raw() {
        let mut memory = Memory::new(16);
        let bytes = [0x13, 0x05, 0x10, 0x00, 0x73, 0x00, 0x00, 0x00];
        let image = load_raw(&bytes, &mut memory).unwrap();
        assert_eq!(image.instruction_count, 2);
        assert_eq!(image.entry_offset, 0);
        assert_eq!(memory.load::<u32>(0), Ok(addi(10, 0, 1)));
    }
}
