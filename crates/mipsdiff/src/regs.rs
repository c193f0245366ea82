//! Architectural register state shared by both models.

use std::fmt;

use gdbstub_arch::mips::reg::MipsCoreRegs;
use mipsdiff_isa::{AddressSet, INST_BYTES, NUM_GPRS, REG_NAMES};

/// Number of recently committed DUT program counters kept for diagnostics.
pub const RECENT_PCS: usize = 3;

/// Architectural register snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterFile {
    /// Program counter. For the reference this is the *next* instruction.
    pub pc: u32,
    pub gpr: [u32; NUM_GPRS],
    pub cause: u32,
    pub hi: u32,
    pub lo: u32,
    pub status: u32,
}

impl RegisterFile {
    /// Canonical starting state: everything zero except the program counter.
    #[must_use]
    pub fn at(pc: u32) -> Self {
        Self {
            pc,
            ..Self::default()
        }
    }

    /// The instruction that just retired, given `pc` points past it.
    #[must_use]
    pub const fn retired_pc(&self) -> u32 {
        self.pc.wrapping_sub(INST_BYTES)
    }

    /// Overlay this snapshot onto a full GDB register block, leaving
    /// registers we do not model (badvaddr, FPU) untouched.
    pub fn write_to(&self, regs: &mut MipsCoreRegs<u32>) {
        regs.r = self.gpr;
        regs.lo = self.lo;
        regs.hi = self.hi;
        regs.pc = self.pc;
        regs.cp0.status = self.status;
        regs.cp0.cause = self.cause;
    }

    /// Render the diagnostic dump. `with_pc` prints the retired PC first.
    #[must_use]
    pub const fn dump(&self, with_pc: bool) -> RegisterDump<'_> {
        RegisterDump {
            regs: self,
            with_pc,
        }
    }
}

impl From<&MipsCoreRegs<u32>> for RegisterFile {
    fn from(regs: &MipsCoreRegs<u32>) -> Self {
        Self {
            pc: regs.pc,
            gpr: regs.r,
            cause: regs.cp0.cause,
            hi: regs.hi,
            lo: regs.lo,
            status: regs.cp0.status,
        }
    }
}

impl From<&RegisterFile> for MipsCoreRegs<u32> {
    fn from(regs: &RegisterFile) -> Self {
        let mut core = Self::default();
        regs.write_to(&mut core);
        core
    }
}

/// Display adapter for [`RegisterFile::dump`].
pub struct RegisterDump<'a> {
    regs: &'a RegisterFile,
    with_pc: bool,
}

impl fmt::Display for RegisterDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let regs = self.regs;
        if self.with_pc {
            writeln!(f, "$pc:{:08x}", regs.retired_pc())?;
        }
        writeln!(
            f,
            "$cs:0x{:08x}  $hi:0x{:08x}  $lo:0x{:08x}  $sr:0x{:08x}",
            regs.cause, regs.hi, regs.lo, regs.status
        )?;
        for (row, values) in regs.gpr.chunks(4).enumerate() {
            let cells: Vec<String> = values
                .iter()
                .enumerate()
                .map(|(col, value)| format!("${:<2}:0x{value:08x}", REG_NAMES[row * 4 + col]))
                .collect();
            writeln!(f, "{}", cells.join("  "))?;
        }
        Ok(())
    }
}

/// The DUT's most recently committed program counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommittedPcs(pub [u32; RECENT_PCS]);

impl CommittedPcs {
    /// True if any recent commit happened at a whitelisted address.
    #[must_use]
    pub fn touches(&self, addrs: &AddressSet) -> bool {
        addrs.intersects(&self.0)
    }

    #[must_use]
    pub const fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

impl fmt::Display for CommittedPcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pc) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("  ")?;
            }
            write!(f, "$pc_{i}:{pc:08x}")?;
        }
        Ok(())
    }
}
