//! Register-file comparison for one lockstep cycle.

use mipsdiff_isa::{AddressSet, NUM_GPRS, REG_ZERO};

use crate::regs::{CommittedPcs, RegisterFile};

/// A register that differs with no whitelist sanction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegMismatch {
    pub reg: usize,
    /// Reference value.
    pub expected: u32,
    /// DUT value.
    pub actual: u32,
}

/// Outcome of comparing one cycle's register files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Comparison {
    /// Sanctioned `(register, reference value)` overwrites to apply to the DUT.
    pub syncs: Vec<(usize, u32)>,
    /// First unsanctioned mismatch; comparison stops there.
    pub mismatch: Option<RegMismatch>,
}

impl Comparison {
    #[must_use]
    pub const fn is_match(&self) -> bool {
        self.mismatch.is_none()
    }
}

/// Compare general-purpose registers of `reference` and `dut`.
///
/// `$0` is architecturally fixed and skipped. A difference is sanctioned
/// when any of the DUT's recently committed PCs is whitelisted; the
/// whitelist describes what the DUT just executed, so the reference PC is
/// not consulted.
#[must_use]
pub fn compare_registers(
    reference: &RegisterFile,
    dut: &RegisterFile,
    dut_pcs: &CommittedPcs,
    whitelist: &AddressSet,
) -> Comparison {
    let mut result = Comparison::default();
    let mut sanctioned = None;

    for reg in (REG_ZERO + 1)..NUM_GPRS {
        let (expected, actual) = (reference.gpr[reg], dut.gpr[reg]);
        if expected == actual {
            continue;
        }
        if *sanctioned.get_or_insert_with(|| dut_pcs.touches(whitelist)) {
            result.syncs.push((reg, expected));
        } else {
            result.mismatch = Some(RegMismatch {
                reg,
                expected,
                actual,
            });
            break;
        }
    }
    result
}
