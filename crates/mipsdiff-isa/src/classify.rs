//! Instruction classification predicates.
//!
//! All predicates are pure. Address-dependent ones take the register file the
//! instruction would execute against.

use crate::AddressSet;
use crate::decode::{
    COP0_MF, FUNC_JALR, FUNC_JR, Inst, OP_BEQL, OP_BGTZ, OP_BGTZL, OP_COP0, OP_J, OP_LW,
    OP_REGIMM, OP_SPECIAL, OP_SW,
};
use crate::regs::NUM_GPRS;

/// Reset and exception entry vectors of the reference board.
pub const DEFAULT_BOOT_VECTORS: [u32; 6] = [
    0xbfc0_0200,
    0xbfc0_0380,
    0xbfc0_0400,
    0x8000_0000,
    0x8000_0180,
    0x8000_0200,
];

/// Half-open address window of memory-mapped I/O.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MmioWindow {
    pub start: u32,
    pub end: u32,
}

impl MmioWindow {
    /// The uncached KSEG1 peripheral window.
    pub const KSEG1: Self = Self {
        start: 0xa000_0000,
        end: 0xc000_0000,
    };

    #[must_use]
    pub const fn contains(&self, addr: u32) -> bool {
        self.start <= addr && addr < self.end
    }
}

impl Default for MmioWindow {
    fn default() -> Self {
        Self::KSEG1
    }
}

/// Jumps and branches, including the SPECIAL (`jr`, `jalr`) and REGIMM
/// (`bltz`..`bgezl`, `bltzal`..`bgezall`) groups.
#[must_use]
pub const fn is_branch(inst: Inst) -> bool {
    match inst.op {
        OP_J..=OP_BGTZ | OP_BEQL..=OP_BGTZL => true,
        OP_SPECIAL => matches!(inst.func, FUNC_JR | FUNC_JALR),
        OP_REGIMM => matches!(inst.rt, 0x00..=0x03 | 0x10..=0x13),
        _ => false,
    }
}

/// `mfc0`: reads a coprocessor-0 register (e.g. Count) into a GPR.
///
/// Results of these reads legitimately differ between the two models.
#[must_use]
pub const fn is_privileged_state_read(inst: Inst) -> bool {
    inst.op == OP_COP0 && inst.rs == COP0_MF && inst.shamt == 0
}

const fn effective_addr(inst: Inst, gpr: &[u32; NUM_GPRS]) -> u32 {
    gpr[inst.rs as usize].wrapping_add(inst.simm as u32)
}

/// Word load whose effective address falls inside `window`.
#[must_use]
pub const fn is_load_mmio(inst: Inst, gpr: &[u32; NUM_GPRS], window: MmioWindow) -> bool {
    inst.op == OP_LW && window.contains(effective_addr(inst, gpr))
}

/// Word store whose effective address falls inside `window`.
#[must_use]
pub const fn is_store_mmio(inst: Inst, gpr: &[u32; NUM_GPRS], window: MmioWindow) -> bool {
    inst.op == OP_SW && window.contains(effective_addr(inst, gpr))
}

#[must_use]
pub const fn is_mmio(inst: Inst, gpr: &[u32; NUM_GPRS], window: MmioWindow) -> bool {
    is_load_mmio(inst, gpr, window) || is_store_mmio(inst, gpr, window)
}

/// True if `pc` is one of the reset/exception entry `vectors`.
#[must_use]
pub fn is_boot_vector(pc: u32, vectors: &AddressSet) -> bool {
    vectors.contains(pc)
}
