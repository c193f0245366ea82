//! Differential Engine.
//!
//! Drives the DUT and the reference in strict alternation. Each cycle the
//! DUT is clocked until it commits at least one instruction, the reference
//! retires the same number of instructions, and the two register files are
//! compared. A whitelisted divergence is reconciled by overwriting the DUT;
//! anything else ends the session with a [`Failure`].

mod compare;
mod config;
mod history;
mod report;

use tracing::{debug, info, trace, warn};

use crate::cancel::CancelToken;
use crate::dut::{Dut, SyncKind};
use crate::error::Result;
use crate::reference::{Reference, ReferenceError};
use crate::regs::{CommittedPcs, RECENT_PCS, RegisterFile};
use mipsdiff_isa::{INST_BYTES, REG_ZERO, is_boot_vector};

pub use compare::{Comparison, RegMismatch, compare_registers};
pub use config::{
    DEFAULT_BUBBLE_CEILING, DEFAULT_RESET_CYCLES, DEFAULT_SYNC_WHITELIST, EngineConfig,
};
pub use history::PcHistory;
pub use report::{Failure, FailureKind, SessionStats, Suspect, SuspectTag};

/// How a session ended.
#[derive(Debug)]
pub enum Outcome {
    /// Operator interruption.
    Interrupted(SessionStats),
    /// The configured commit limit was reached without divergence.
    Completed(SessionStats),
    Failed(Box<Failure>),
}

impl Outcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        match self {
            Self::Interrupted(stats) | Self::Completed(stats) => *stats,
            Self::Failed(failure) => failure.stats,
        }
    }
}

/// Result of one lockstep cycle.
enum Step {
    Matched,
    Stopped(Outcome),
}

/// Lockstep session over a reference and a DUT.
pub struct Engine<R, D> {
    reference: R,
    dut: D,
    config: EngineConfig,
    cancel: CancelToken,
    stats: SessionStats,
    reference_pcs: PcHistory<RECENT_PCS>,
    /// Reference registers at the last matched comparison.
    last_matched: RegisterFile,
}

impl<R: Reference, D: Dut> Engine<R, D> {
    pub fn new(reference: R, dut: D, config: EngineConfig, cancel: CancelToken) -> Self {
        let last_matched = RegisterFile::at(config.entry);
        Self {
            reference,
            dut,
            config,
            cancel,
            stats: SessionStats::default(),
            reference_pcs: PcHistory::new(),
            last_matched,
        }
    }

    /// Give back both controllers, e.g. to disconnect the reference.
    pub fn into_parts(self) -> (R, D) {
        (self.reference, self.dut)
    }

    /// Bring both models to the program entry with identical state.
    ///
    /// The reference is run to a breakpoint at the entry, after which both
    /// register files are forced to the canonical zero state.
    pub fn init(&mut self) -> Result<()> {
        let entry = self.config.entry;
        let canonical = RegisterFile::at(entry);
        info!(entry = format_args!("{entry:#010x}"), "initialising both models");

        self.reference.set_registers(&canonical)?;
        self.reference.set_breakpoint(entry)?;
        self.reference.continue_until_breakpoint()?;
        self.reference.remove_breakpoint(entry)?;
        self.reference.set_registers(&canonical)?;

        self.dut
            .reset(self.config.dut_reset_cycles, &self.config.symbol_file)?;
        self.dut.sync_register(REG_ZERO, 0, SyncKind::Init)?;

        self.last_matched = canonical;
        debug!("models synchronised at entry");
        Ok(())
    }

    /// Initialise, then compare until failure, interruption or the commit
    /// limit.
    pub fn run(&mut self) -> Result<Outcome> {
        let outcome = match self.init().and_then(|()| self.run_loop()) {
            Err(e) if self.cancel.is_cancelled() && is_cancellation(&e) => {
                Ok(Outcome::Interrupted(self.stats))
            }
            other => other,
        }?;
        crate::metrics::record_session(&self.stats);

        match &outcome {
            Outcome::Interrupted(stats) => info!(commits = stats.commits, "session interrupted"),
            Outcome::Completed(stats) => info!(commits = stats.commits, "commit limit reached"),
            Outcome::Failed(failure) => warn!(kind = %failure.kind, "session failed"),
        }
        Ok(outcome)
    }

    fn run_loop(&mut self) -> Result<Outcome> {
        info!("lockstep comparison running");
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Outcome::Interrupted(self.stats));
            }
            if let Some(limit) = self.config.max_commits {
                if self.stats.commits >= limit {
                    return Ok(Outcome::Completed(self.stats));
                }
            }
            if let Step::Stopped(outcome) = self.cycle()? {
                return Ok(outcome);
            }
        }
    }

    /// Run exactly one lockstep cycle.
    fn cycle(&mut self) -> Result<Step> {
        self.dut.step(1)?;
        self.stats.cycles += 1;
        self.dut.sync_register(REG_ZERO, 0, SyncKind::Init)?;

        let mut bubbles = 0u32;
        let mut commits = self.dut.commit_count()?;
        while commits == 0 {
            if self.cancel.is_cancelled() {
                return Ok(Step::Stopped(Outcome::Interrupted(self.stats)));
            }
            bubbles += 1;
            self.stats.bubbles += 1;
            if bubbles > self.config.bubble_ceiling {
                return self.stall(bubbles).map(Step::Stopped);
            }
            self.dut.step(1)?;
            self.stats.cycles += 1;
            commits = self.dut.commit_count()?;
        }
        self.stats.commits += u64::from(commits);

        for _ in 0..commits {
            self.reference.single_step()?;
            self.stats.reference_steps += 1;
        }
        let reference = self.reference.get_registers()?;
        let dut = self.dut.get_registers()?;
        let dut_pcs = self.dut.recent_pcs()?;
        trace!(
            commits,
            bubbles,
            pc = format_args!("{:#010x}", reference.retired_pc()),
            "cycle"
        );

        let comparison = compare_registers(&reference, &dut, &dut_pcs, &self.config.sync_whitelist);
        if let Some(mismatch) = comparison.mismatch {
            let failure = self.mismatch(mismatch, commits, reference, dut, dut_pcs);
            return Ok(Step::Stopped(Outcome::Failed(Box::new(failure))));
        }

        for &(reg, value) in &comparison.syncs {
            debug!(
                reg,
                value = format_args!("{value:#010x}"),
                pcs = %dut_pcs,
                "sanctioned register sync"
            );
            self.dut.force_sync_register(reg, value)?;
            self.stats.syncs += 1;
        }

        let retired = reference.retired_pc();
        if is_boot_vector(retired, &self.config.boot_vectors) {
            debug!(pc = format_args!("{retired:#010x}"), "exception vector entered");
        }
        self.reference_pcs.push(retired);
        self.last_matched = reference;
        Ok(Step::Matched)
    }

    fn mismatch(
        &mut self,
        mismatch: RegMismatch,
        commits: u32,
        reference: RegisterFile,
        dut: RegisterFile,
        dut_pcs: CommittedPcs,
    ) -> Failure {
        let suspect = self.suspect(reference.retired_pc(), commits == 1);
        Failure {
            kind: FailureKind::Mismatch(mismatch),
            reference,
            dut,
            dut_pcs,
            reference_pcs: CommittedPcs(self.reference_pcs.as_array()),
            suspect,
            stats: self.stats,
        }
    }

    fn stall(&mut self, bubbles: u32) -> Result<Outcome> {
        let dut = self.dut.get_registers()?;
        let dut_pcs = self.dut.recent_pcs()?;
        Ok(Outcome::Failed(Box::new(Failure {
            kind: FailureKind::Stall { bubbles },
            reference: self.last_matched.clone(),
            dut,
            dut_pcs,
            reference_pcs: CommittedPcs(self.reference_pcs.as_array()),
            suspect: None,
            stats: self.stats,
        })))
    }

    /// Fetch and classify the instruction at `pc`. Best effort: an
    /// unreadable address only loses the annotation.
    ///
    /// The last matched registers are the state `pc` executed against only
    /// when it was the single commit of the cycle (`sole_commit`); otherwise
    /// MMIO classification is skipped.
    fn suspect(&mut self, pc: u32, sole_commit: bool) -> Option<Suspect> {
        let word = match self.reference.read_word(pc) {
            Ok(word) => word,
            Err(e) => {
                debug!(
                    pc = format_args!("{pc:#010x}"),
                    error = %e,
                    "cannot fetch suspect instruction"
                );
                return None;
            }
        };
        let prev = self.reference.read_word(pc.wrapping_sub(INST_BYTES)).ok();
        Some(Suspect::classify(
            pc,
            word,
            prev,
            sole_commit.then_some(&self.last_matched.gpr),
            self.config.mmio,
            &self.config.boot_vectors,
        ))
    }
}

const fn is_cancellation(error: &crate::Error) -> bool {
    matches!(
        error,
        crate::Error::Reference(ReferenceError::Cancelled { .. })
    )
}
