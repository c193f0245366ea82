//! DUT Stepper: drives the pipelined core's simulation.
//!
//! The simulation is an opaque cycle-stepped model. It may commit zero or
//! more instructions per cycle.

mod library;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::regs::{CommittedPcs, RegisterFile};

pub use library::{DutLibrary, RawRegs};

/// DUT stepper error.
#[derive(Debug, Error)]
pub enum DutError {
    #[error("failed to load DUT library: {0}")]
    Load(#[from] libloading::Error),

    #[error("DUT library not found: {0}")]
    LibraryNotFound(PathBuf),

    #[error("failed to find symbol '{0}': {1}")]
    SymbolNotFound(&'static str, libloading::Error),

    #[error("symbol file path is not representable as a C string: {0}")]
    InvalidPath(PathBuf),

    #[error("register index {0} out of range")]
    InvalidRegister(usize),
}

/// Why a DUT register is being overwritten.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncKind {
    /// Establishing the initial state (e.g. pinning `$0` to zero).
    Init,
    /// Reconciling divergence at a whitelisted program counter.
    Sanctioned,
}

impl SyncKind {
    #[must_use]
    pub const fn is_sanctioned(self) -> bool {
        matches!(self, Self::Sanctioned)
    }
}

/// Synchronous control of the device under test.
pub trait Dut {
    /// Reset to the initial architectural state.
    fn reset(&mut self, timeout_cycles: u64, symbol_file: &Path) -> Result<(), DutError>;

    /// Advance the simulation by `cycles` clock cycles.
    fn step(&mut self, cycles: u64) -> Result<(), DutError>;

    /// Instructions committed in the last cycle; zero is a pipeline bubble.
    fn commit_count(&mut self) -> Result<u32, DutError>;

    fn get_registers(&mut self) -> Result<RegisterFile, DutError>;

    fn recent_pcs(&mut self) -> Result<CommittedPcs, DutError>;

    /// Overwrite one general-purpose register.
    fn sync_register(&mut self, index: usize, value: u32, kind: SyncKind) -> Result<(), DutError>;

    /// Reconcile a whitelisted divergence. Never used to mask a genuine bug.
    fn force_sync_register(&mut self, index: usize, value: u32) -> Result<(), DutError> {
        self.sync_register(index, value, SyncKind::Sanctioned)
    }
}
