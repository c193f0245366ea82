//! Entry-point lookup in the program image.
//!
//! Only the ELF header is read. Loading segments is the business of the two
//! models.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ELF_CLASS_32: u8 = 1;
const ELF_DATA_LSB: u8 = 1;
const EM_MIPS: u16 = 8;
const HEADER_LEN: usize = 52;
const E_MACHINE: usize = 18;
const E_ENTRY: usize = 24;

#[derive(Debug, Error)]
pub enum ElfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ELF data too small")]
    TooSmall,
    #[error("Invalid ELF magic number")]
    InvalidMagic,
    #[error("Only 32-bit ELF supported, got class {0}")]
    UnsupportedClass(u8),
    #[error("Only little-endian ELF supported")]
    NotLittleEndian,
    #[error("Not a MIPS ELF (machine {0})")]
    UnsupportedMachine(u16),
}

/// Read `e_entry` from the ELF32 little-endian MIPS image at `path`.
pub fn read_entry(path: &Path) -> Result<u32, ElfError> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    File::open(path)?
        .take(HEADER_LEN as u64)
        .read_to_end(&mut header)?;
    parse_entry(&header)
}

fn parse_entry(data: &[u8]) -> Result<u32, ElfError> {
    if data.len() < HEADER_LEN {
        return Err(ElfError::TooSmall);
    }
    if data[..4] != ELF_MAGIC {
        return Err(ElfError::InvalidMagic);
    }
    if data[4] != ELF_CLASS_32 {
        return Err(ElfError::UnsupportedClass(data[4]));
    }
    if data[5] != ELF_DATA_LSB {
        return Err(ElfError::NotLittleEndian);
    }
    let machine = u16::from_le_bytes([data[E_MACHINE], data[E_MACHINE + 1]]);
    if machine != EM_MIPS {
        return Err(ElfError::UnsupportedMachine(machine));
    }
    let mut entry = [0u8; 4];
    entry.copy_from_slice(&data[E_ENTRY..E_ENTRY + 4]);
    Ok(u32::from_le_bytes(entry))
}
