//! Divergence diagnostics.

use std::fmt;

use mipsdiff_isa::{
    AddressSet, Inst, MmioWindow, NUM_GPRS, is_boot_vector, is_branch, is_load_mmio,
    is_privileged_state_read, is_store_mmio, reg_name,
};

use super::compare::RegMismatch;
use crate::regs::{CommittedPcs, RegisterFile};

/// Counters for one session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// DUT clock cycles, bubbles included.
    pub cycles: u64,
    /// Instructions committed by the DUT.
    pub commits: u64,
    pub bubbles: u64,
    pub reference_steps: u64,
    /// Sanctioned register overwrites.
    pub syncs: u64,
}

impl SessionStats {
    /// Average commits per DUT cycle.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn commits_per_cycle(&self) -> f64 {
        if self.cycles == 0 {
            return 0.0;
        }
        self.commits as f64 / self.cycles as f64
    }
}

/// What made the session fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Unsanctioned register divergence.
    Mismatch(RegMismatch),
    /// The DUT committed nothing for more than the bubble ceiling.
    Stall { bubbles: u32 },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch(m) => write!(
                f,
                "Error in ${}, reference 0x{:08x}, DUT 0x{:08x}",
                reg_name(m.reg),
                m.expected,
                m.actual
            ),
            Self::Stall { bubbles } => {
                write!(f, "Too many bubbles ({bubbles} cycles without a commit)")
            }
        }
    }
}

/// Property of the instruction last retired by the reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspectTag {
    Branch,
    /// Executes in the delay slot of the preceding branch.
    DelaySlot,
    /// Coprocessor-0 read whose value legitimately differs between models.
    PrivilegedRead,
    MmioLoad,
    MmioStore,
    /// Entry point of a reset or exception vector.
    ExceptionVector,
}

impl fmt::Display for SuspectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch => write!(f, "branch"),
            Self::DelaySlot => write!(f, "delay slot"),
            Self::PrivilegedRead => write!(f, "mfc0"),
            Self::MmioLoad => write!(f, "MMIO load"),
            Self::MmioStore => write!(f, "MMIO store"),
            Self::ExceptionVector => write!(f, "exception vector"),
        }
    }
}

/// Annotation of the instruction at the divergence point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Suspect {
    pub pc: u32,
    pub word: u32,
    pub tags: Vec<SuspectTag>,
}

impl Suspect {
    /// Classify `word` fetched at `pc`.
    ///
    /// `prev` is the word before it, if readable. `gpr` is the register state
    /// the instruction executed against, used for effective addresses. It is
    /// only known when the instruction was the sole commit of its cycle;
    /// without it MMIO accesses are not tagged.
    #[must_use]
    pub fn classify(
        pc: u32,
        word: u32,
        prev: Option<u32>,
        gpr: Option<&[u32; NUM_GPRS]>,
        mmio: MmioWindow,
        vectors: &AddressSet,
    ) -> Self {
        let inst = Inst::decode(word);
        let mut tags = Vec::new();
        if is_branch(inst) {
            tags.push(SuspectTag::Branch);
        }
        if prev.is_some_and(|w| is_branch(Inst::decode(w))) {
            tags.push(SuspectTag::DelaySlot);
        }
        if is_privileged_state_read(inst) {
            tags.push(SuspectTag::PrivilegedRead);
        }
        if let Some(gpr) = gpr {
            if is_load_mmio(inst, gpr, mmio) {
                tags.push(SuspectTag::MmioLoad);
            }
            if is_store_mmio(inst, gpr, mmio) {
                tags.push(SuspectTag::MmioStore);
            }
        }
        if is_boot_vector(pc, vectors) {
            tags.push(SuspectTag::ExceptionVector);
        }
        Self { pc, word, tags }
    }

    #[must_use]
    pub fn has(&self, tag: SuspectTag) -> bool {
        self.tags.contains(&tag)
    }
}

impl fmt::Display for Suspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}: {:08x}", self.pc, self.word)?;
        if !self.tags.is_empty() {
            let tags: Vec<String> = self.tags.iter().map(ToString::to_string).collect();
            write!(f, " ({})", tags.join(", "))?;
        }
        Ok(())
    }
}

/// Full diagnostic state captured when a session fails.
#[derive(Clone, Debug)]
pub struct Failure {
    pub kind: FailureKind,
    /// Reference registers at the failing comparison, or the last matched
    /// state for a stall.
    pub reference: RegisterFile,
    pub dut: RegisterFile,
    pub dut_pcs: CommittedPcs,
    /// PCs the reference retired at the last three matched comparisons.
    pub reference_pcs: CommittedPcs,
    pub suspect: Option<Suspect>,
    pub stats: SessionStats,
}

impl Failure {
    #[must_use]
    pub const fn is_stall(&self) -> bool {
        matches!(self.kind, FailureKind::Stall { .. })
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind)?;
        if let Some(suspect) = &self.suspect {
            writeln!(f, "suspect  {suspect}")?;
        }
        writeln!(f)?;
        writeln!(f, "reference")?;
        write!(f, "{}", self.reference.dump(true))?;
        writeln!(f, "{}", self.reference_pcs)?;
        writeln!(f)?;
        writeln!(f, "DUT")?;
        write!(f, "{}", self.dut.dump(false))?;
        writeln!(f, "{}", self.dut_pcs)?;
        writeln!(f)?;
        write!(
            f,
            "{} cycles, {} commits, {} bubbles, {} syncs",
            self.stats.cycles, self.stats.commits, self.stats.bubbles, self.stats.syncs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mipsdiff_isa::DEFAULT_BOOT_VECTORS;

    fn vectors() -> AddressSet {
        AddressSet::from(&DEFAULT_BOOT_VECTORS[..])
    }

    #[test]
    fn test_classify_mfc0_in_delay_slot() {
        // jr $ra ; mfc0 $t0, $9
        let jr_ra = 0x03e0_0008;
        let mfc0 = 0x4008_4800;
        let suspect = Suspect::classify(
            0x8000_0104,
            mfc0,
            Some(jr_ra),
            Some(&[0; NUM_GPRS]),
            MmioWindow::KSEG1,
            &vectors(),
        );
        assert_eq!(
            suspect.tags,
            vec![SuspectTag::DelaySlot, SuspectTag::PrivilegedRead]
        );
        assert_eq!(suspect.to_string(), "80000104: 40084800 (delay slot, mfc0)");
    }

    #[test]
    fn test_classify_mmio_store_at_vector() {
        // sw $t1, 0($t0) with $t0 in KSEG1
        let sw = 0xad09_0000;
        let mut gpr = [0; NUM_GPRS];
        gpr[8] = 0xbfd0_03f8;
        let suspect = Suspect::classify(
            0x8000_0180,
            sw,
            None,
            Some(&gpr),
            MmioWindow::KSEG1,
            &vectors(),
        );
        assert!(suspect.has(SuspectTag::MmioStore));
        assert!(suspect.has(SuspectTag::ExceptionVector));
        assert!(!suspect.has(SuspectTag::MmioLoad));
    }

    #[test]
    fn test_mmio_untagged_without_register_state() {
        // lw $t1, 0($t0): the base register is unknown, so no MMIO claim.
        let lw = 0x8d09_0000;
        let suspect =
            Suspect::classify(0x8000_0100, lw, None, None, MmioWindow::KSEG1, &vectors());
        assert!(suspect.tags.is_empty());
        assert_eq!(suspect.to_string(), "80000100: 8d090000");
    }

    #[test]
    fn test_mismatch_dump_names_register_and_both_sides() {
        let mut reference = RegisterFile::at(0x8000_0008);
        reference.gpr[2] = 3;
        let mut dut = RegisterFile::at(0x8000_0008);
        dut.gpr[2] = 5;
        let failure = Failure {
            kind: FailureKind::Mismatch(RegMismatch {
                reg: 2,
                expected: 3,
                actual: 5,
            }),
            reference,
            dut,
            dut_pcs: CommittedPcs([0x8000_0000, 0x8000_0004, 0x8000_0004]),
            reference_pcs: CommittedPcs([0, 0x8000_0000, 0x8000_0000]),
            suspect: None,
            stats: SessionStats::default(),
        };
        let text = failure.to_string();
        assert!(text.starts_with("Error in $v0, reference 0x00000003, DUT 0x00000005"));
        assert!(text.contains("$pc:80000004"));
        assert!(text.contains("$v0:0x00000003"));
        assert!(text.contains("$v0:0x00000005"));
        assert!(text.contains("$pc_0:80000000  $pc_1:80000004  $pc_2:80000004"));
        assert!(!failure.is_stall());
    }

    #[test]
    fn test_stall_dump() {
        let failure = Failure {
            kind: FailureKind::Stall { bubbles: 17 },
            reference: RegisterFile::default(),
            dut: RegisterFile::default(),
            dut_pcs: CommittedPcs::default(),
            reference_pcs: CommittedPcs::default(),
            suspect: None,
            stats: SessionStats::default(),
        };
        assert!(failure.is_stall());
        assert!(failure.to_string().starts_with("Too many bubbles (17 cycles"));
    }

    #[test]
    fn test_commits_per_cycle() {
        let stats = SessionStats {
            cycles: 8,
            commits: 6,
            ..SessionStats::default()
        };
        assert!((stats.commits_per_cycle() - 0.75).abs() < f64::EPSILON);
        assert!(SessionStats::default().commits_per_cycle().abs() < f64::EPSILON);
    }
}
