use thiserror::Error;

use crate::dut::DutError;
use crate::elf::ElfError;
use crate::reference::ReferenceError;
use crate::supervisor::SupervisorError;

/// Session errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reference: {0}")]
    Reference(#[from] ReferenceError),
    #[error("DUT: {0}")]
    Dut(#[from] DutError),
    #[error("ELF error: {0}")]
    Elf(#[from] ElfError),
    #[error("supervisor: {0}")]
    Supervisor(#[from] SupervisorError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
