//! Differential engine configuration.

use std::path::PathBuf;

use mipsdiff_isa::{AddressSet, DEFAULT_BOOT_VECTORS, MmioWindow};

/// Consecutive bubble cycles tolerated before declaring a stall.
pub const DEFAULT_BUBBLE_CEILING: u32 = 2048 * 8;
/// Cycle budget handed to the DUT reset routine.
pub const DEFAULT_RESET_CYCLES: u64 = 10;
/// PCs of the Count-register reads in the stock test image.
pub const DEFAULT_SYNC_WHITELIST: [u32; 2] = [0x8000_58ec, 0x8002_4b7c];

/// Configuration for one differential session.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Program entry address both models start from.
    pub entry: u32,
    /// DUT PCs at which register divergence is reconciled instead of reported.
    pub sync_whitelist: AddressSet,
    /// Reset and exception entry vectors.
    pub boot_vectors: AddressSet,
    pub mmio: MmioWindow,
    pub bubble_ceiling: u32,
    pub dut_reset_cycles: u64,
    /// Program image handed to the DUT on reset.
    pub symbol_file: PathBuf,
    /// Stop cleanly after this many committed instructions.
    pub max_commits: Option<u64>,
}

impl EngineConfig {
    /// Defaults for a program starting at `entry`.
    pub fn new(entry: u32, symbol_file: impl Into<PathBuf>) -> Self {
        Self {
            entry,
            sync_whitelist: AddressSet::from(&DEFAULT_SYNC_WHITELIST[..]),
            boot_vectors: AddressSet::from(&DEFAULT_BOOT_VECTORS[..]),
            mmio: MmioWindow::default(),
            bubble_ceiling: DEFAULT_BUBBLE_CEILING,
            dut_reset_cycles: DEFAULT_RESET_CYCLES,
            symbol_file: symbol_file.into(),
            max_commits: None,
        }
    }
}
