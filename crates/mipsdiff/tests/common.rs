//! Scripted models for engine tests.
//!
//! Both models run the same toy program: every instruction is 4 bytes and
//! retiring it applies the register writes listed for its PC, then advances
//! the PC. The DUT can be told to commit several instructions per cycle, to
//! bubble, or to write different values at chosen PCs.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

use mipsdiff::{
    CommittedPcs, Dut, DutError, RECENT_PCS, Reference, ReferenceError, RegisterFile, SyncKind,
};

pub const ENTRY: u32 = 0x8000_0000;

/// Register writes per PC.
pub type Program = HashMap<u32, Vec<(usize, u32)>>;

/// Observable controller calls, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    RefSetRegisters(u32),
    RefBreakpoint(u32),
    RefContinue,
    RefRemoveBreakpoint(u32),
    RefStep,
    RefGetRegisters,
    DutReset,
    DutStep,
    DutCommit(u32),
    DutSync(usize, u32, SyncKind),
}

pub type Log = Rc<RefCell<Vec<Event>>>;

fn retire(regs: &mut RegisterFile, program: &Program) {
    if let Some(writes) = program.get(&regs.pc) {
        for &(reg, value) in writes {
            regs.gpr[reg] = value;
        }
    }
    regs.pc = regs.pc.wrapping_add(4);
}

pub struct MockReference {
    pub regs: RegisterFile,
    pub program: Program,
    pub memory: HashMap<u32, u32>,
    pub breakpoints: Vec<u32>,
    pub log: Log,
}

impl MockReference {
    pub fn new(program: Program, log: Log) -> Self {
        Self {
            regs: RegisterFile::at(0xbfc0_0000),
            program,
            memory: HashMap::new(),
            breakpoints: Vec::new(),
            log,
        }
    }
}

impl Reference for MockReference {
    fn set_registers(&mut self, regs: &RegisterFile) -> Result<(), ReferenceError> {
        self.log.borrow_mut().push(Event::RefSetRegisters(regs.pc));
        self.regs = regs.clone();
        Ok(())
    }

    fn get_registers(&mut self) -> Result<RegisterFile, ReferenceError> {
        self.log.borrow_mut().push(Event::RefGetRegisters);
        Ok(self.regs.clone())
    }

    fn set_breakpoint(&mut self, addr: u32) -> Result<(), ReferenceError> {
        self.log.borrow_mut().push(Event::RefBreakpoint(addr));
        self.breakpoints.push(addr);
        Ok(())
    }

    fn remove_breakpoint(&mut self, addr: u32) -> Result<(), ReferenceError> {
        self.log.borrow_mut().push(Event::RefRemoveBreakpoint(addr));
        self.breakpoints.retain(|&bp| bp != addr);
        Ok(())
    }

    fn continue_until_breakpoint(&mut self) -> Result<(), ReferenceError> {
        self.log.borrow_mut().push(Event::RefContinue);
        for _ in 0..1024 {
            if self.breakpoints.contains(&self.regs.pc) {
                return Ok(());
            }
            retire(&mut self.regs, &self.program);
        }
        Err(ReferenceError::Exited("ran off the program".into()))
    }

    fn single_step(&mut self) -> Result<(), ReferenceError> {
        self.log.borrow_mut().push(Event::RefStep);
        retire(&mut self.regs, &self.program);
        Ok(())
    }

    fn read_word(&mut self, addr: u32) -> Result<u32, ReferenceError> {
        self.memory
            .get(&addr)
            .copied()
            .ok_or(ReferenceError::ErrorReply { op: "m", code: 1 })
    }

    fn disconnect(&mut self) -> Result<(), ReferenceError> {
        Ok(())
    }
}

pub struct MockDut {
    pub regs: RegisterFile,
    pub program: Program,
    /// Writes the DUT performs instead of the program's at these PCs.
    pub faults: Program,
    /// Commit counts per cycle; one commit per cycle once exhausted.
    pub schedule: VecDeque<u32>,
    pub recent: [u32; RECENT_PCS],
    pub last_commits: u32,
    pub log: Log,
}

impl MockDut {
    pub fn new(program: Program, log: Log) -> Self {
        Self {
            regs: RegisterFile::default(),
            program,
            faults: Program::new(),
            schedule: VecDeque::new(),
            recent: [0; RECENT_PCS],
            last_commits: 0,
            log,
        }
    }

    #[must_use]
    pub fn with_faults(mut self, faults: Program) -> Self {
        self.faults = faults;
        self
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: impl IntoIterator<Item = u32>) -> Self {
        self.schedule = schedule.into_iter().collect();
        self
    }

    fn commit_one(&mut self) {
        let pc = self.regs.pc;
        let program = if self.faults.contains_key(&pc) {
            &self.faults
        } else {
            &self.program
        };
        retire(&mut self.regs, program);
        self.recent.rotate_left(1);
        self.recent[RECENT_PCS - 1] = pc;
    }
}

impl Dut for MockDut {
    fn reset(&mut self, _timeout_cycles: u64, _symbol_file: &Path) -> Result<(), DutError> {
        self.log.borrow_mut().push(Event::DutReset);
        self.regs = RegisterFile::at(ENTRY);
        self.recent = [0; RECENT_PCS];
        Ok(())
    }

    fn step(&mut self, cycles: u64) -> Result<(), DutError> {
        for _ in 0..cycles {
            self.log.borrow_mut().push(Event::DutStep);
            let commits = self.schedule.pop_front().unwrap_or(1);
            for _ in 0..commits {
                self.commit_one();
            }
            self.last_commits = commits;
        }
        Ok(())
    }

    fn commit_count(&mut self) -> Result<u32, DutError> {
        let commits = std::mem::take(&mut self.last_commits);
        self.log.borrow_mut().push(Event::DutCommit(commits));
        Ok(commits)
    }

    fn get_registers(&mut self) -> Result<RegisterFile, DutError> {
        Ok(self.regs.clone())
    }

    fn recent_pcs(&mut self) -> Result<CommittedPcs, DutError> {
        Ok(CommittedPcs(self.recent))
    }

    fn sync_register(&mut self, index: usize, value: u32, kind: SyncKind) -> Result<(), DutError> {
        if index >= self.regs.gpr.len() {
            return Err(DutError::InvalidRegister(index));
        }
        self.log.borrow_mut().push(Event::DutSync(index, value, kind));
        self.regs.gpr[index] = value;
        Ok(())
    }
}

/// A straight-line program: `$v0` counts instructions from `ENTRY`.
pub fn counting_program(len: u32) -> Program {
    (0..len)
        .map(|i| (ENTRY + 4 * i, vec![(2, i + 1)]))
        .collect()
}

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}
