//! `GdbReference` against an in-process MIPS stub served by gdbstub.

mod common;

use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use gdbstub::arch::Arch;
use gdbstub::common::Signal;
use gdbstub::conn::ConnectionExt;
use gdbstub::stub::run_blocking::{BlockingEventLoop, Event, WaitForStopReasonError};
use gdbstub::stub::{DisconnectReason, GdbStub, SingleThreadStopReason};
use gdbstub::target::ext::base::BaseOps;
use gdbstub::target::ext::base::singlethread::{
    SingleThreadBase, SingleThreadResume, SingleThreadResumeOps, SingleThreadSingleStep,
    SingleThreadSingleStepOps,
};
use gdbstub::target::ext::breakpoints::{
    Breakpoints, BreakpointsOps, SwBreakpoint, SwBreakpointOps,
};
use gdbstub::target::{Target, TargetResult};
use gdbstub_arch::mips::Mips;
use gdbstub_arch::mips::reg::MipsCoreRegs;

use common::{ENTRY, MockDut, counting_program, new_log};
use mipsdiff::{
    CancelToken, ConnectOptions, Engine, EngineConfig, GdbReference, Outcome, Reference,
    ReferenceError, RegisterFile,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExecMode {
    Continue,
    Step,
}

/// Toy core: every instruction increments `$v0`.
struct FakeMips {
    regs: MipsCoreRegs<u32>,
    memory: HashMap<u32, u8>,
    breakpoints: HashSet<u32>,
    exec_mode: ExecMode,
    /// Instructions a `c` may run before the program "exits".
    run_limit: u32,
    disconnect: Option<DisconnectReason>,
}

impl FakeMips {
    fn new() -> Self {
        let mut regs = MipsCoreRegs::<u32>::default();
        regs.pc = 0xbfc0_0000;
        regs.cp0.badvaddr = 0xdead_beef;
        regs.fpu.fir = 0x0073_0000;
        Self {
            regs,
            memory: HashMap::new(),
            breakpoints: HashSet::new(),
            exec_mode: ExecMode::Continue,
            run_limit: 1000,
            disconnect: None,
        }
    }

    fn with_word(mut self, addr: u32, word: u32) -> Self {
        for (i, byte) in word.to_le_bytes().into_iter().enumerate() {
            self.memory.insert(addr + i as u32, byte);
        }
        self
    }

    fn retire(&mut self) {
        self.regs.r[2] = self.regs.r[2].wrapping_add(1);
        self.regs.pc = self.regs.pc.wrapping_add(4);
    }

    fn run_until_stop(&mut self) -> SingleThreadStopReason<u32> {
        if self.exec_mode == ExecMode::Step {
            self.retire();
            return SingleThreadStopReason::DoneStep;
        }
        for _ in 0..self.run_limit {
            if self.breakpoints.contains(&self.regs.pc) {
                return SingleThreadStopReason::SwBreak(());
            }
            self.retire();
        }
        SingleThreadStopReason::Exited(0)
    }
}

impl Target for FakeMips {
    type Arch = Mips;
    type Error = &'static str;

    fn base_ops(&mut self) -> BaseOps<'_, Self::Arch, Self::Error> {
        BaseOps::SingleThread(self)
    }

    fn support_breakpoints(&mut self) -> Option<BreakpointsOps<'_, Self>> {
        Some(self)
    }
}

impl SingleThreadBase for FakeMips {
    fn read_registers(&mut self, regs: &mut MipsCoreRegs<u32>) -> TargetResult<(), Self> {
        *regs = self.regs.clone();
        Ok(())
    }

    fn write_registers(&mut self, regs: &MipsCoreRegs<u32>) -> TargetResult<(), Self> {
        self.regs = regs.clone();
        Ok(())
    }

    fn read_addrs(&mut self, start_addr: u32, data: &mut [u8]) -> TargetResult<usize, Self> {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = self
                .memory
                .get(&start_addr.wrapping_add(i as u32))
                .copied()
                .unwrap_or(0);
        }
        Ok(data.len())
    }

    fn write_addrs(&mut self, start_addr: u32, data: &[u8]) -> TargetResult<(), Self> {
        for (i, &byte) in data.iter().enumerate() {
            self.memory.insert(start_addr.wrapping_add(i as u32), byte);
        }
        Ok(())
    }

    fn support_resume(&mut self) -> Option<SingleThreadResumeOps<'_, Self>> {
        Some(self)
    }
}

impl SingleThreadResume for FakeMips {
    fn resume(&mut self, _signal: Option<Signal>) -> Result<(), Self::Error> {
        self.exec_mode = ExecMode::Continue;
        Ok(())
    }

    fn support_single_step(&mut self) -> Option<SingleThreadSingleStepOps<'_, Self>> {
        Some(self)
    }
}

impl SingleThreadSingleStep for FakeMips {
    fn step(&mut self, _signal: Option<Signal>) -> Result<(), Self::Error> {
        self.exec_mode = ExecMode::Step;
        Ok(())
    }
}

impl Breakpoints for FakeMips {
    fn support_sw_breakpoint(&mut self) -> Option<SwBreakpointOps<'_, Self>> {
        Some(self)
    }
}

impl SwBreakpoint for FakeMips {
    fn add_sw_breakpoint(
        &mut self,
        addr: u32,
        _kind: <Self::Arch as Arch>::BreakpointKind,
    ) -> TargetResult<bool, Self> {
        self.breakpoints.insert(addr);
        Ok(true)
    }

    fn remove_sw_breakpoint(
        &mut self,
        addr: u32,
        _kind: <Self::Arch as Arch>::BreakpointKind,
    ) -> TargetResult<bool, Self> {
        Ok(self.breakpoints.remove(&addr))
    }
}

struct FakeEventLoop;

impl BlockingEventLoop for FakeEventLoop {
    type Target = FakeMips;
    type Connection = TcpStream;
    type StopReason = SingleThreadStopReason<u32>;

    fn wait_for_stop_reason(
        target: &mut FakeMips,
        conn: &mut Self::Connection,
    ) -> Result<Event<Self::StopReason>, WaitForStopReasonError<&'static str, std::io::Error>>
    {
        if conn.peek().map(|b| b.is_some()).unwrap_or(false) {
            let byte = conn.read().map_err(WaitForStopReasonError::Connection)?;
            return Ok(Event::IncomingData(byte));
        }
        Ok(Event::TargetStopped(target.run_until_stop()))
    }

    fn on_interrupt(_target: &mut FakeMips) -> Result<Option<Self::StopReason>, &'static str> {
        Ok(Some(SingleThreadStopReason::Signal(Signal::SIGINT)))
    }
}

fn serve(mut target: FakeMips) -> (SocketAddr, JoinHandle<FakeMips>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let reason = GdbStub::new(stream)
            .run_blocking::<FakeEventLoop>(&mut target)
            .unwrap();
        target.disconnect = Some(reason);
        target
    });
    (addr, handle)
}

fn connect(addr: SocketAddr) -> GdbReference {
    GdbReference::connect(addr, ConnectOptions::default()).unwrap()
}

#[test]
fn test_register_round_trip_keeps_unmodelled_state() {
    let (addr, server) = serve(FakeMips::new());
    let mut reference = connect(addr);

    let mut regs = RegisterFile::at(0x8000_0400);
    regs.gpr[29] = 0x8010_0000;
    regs.gpr[31] = 0x8000_0010;
    regs.hi = 7;
    regs.lo = 9;
    regs.status = 0x1000_ff01;
    regs.cause = 0x24;
    reference.set_registers(&regs).unwrap();
    assert_eq!(reference.get_registers().unwrap(), regs);
    reference.disconnect().unwrap();

    let target = server.join().unwrap();
    assert!(matches!(target.disconnect, Some(DisconnectReason::Disconnect)));
    assert_eq!(target.regs.cp0.badvaddr, 0xdead_beef);
    assert_eq!(target.regs.fpu.fir, 0x0073_0000);
    assert_eq!(target.regs.r[29], 0x8010_0000);
}

#[test]
fn test_single_step_retires_one_instruction() {
    let (addr, server) = serve(FakeMips::new());
    let mut reference = connect(addr);

    reference.set_registers(&RegisterFile::at(ENTRY)).unwrap();
    reference.single_step().unwrap();
    reference.single_step().unwrap();
    let regs = reference.get_registers().unwrap();
    assert_eq!(regs.pc, ENTRY + 8);
    assert_eq!(regs.retired_pc(), ENTRY + 4);
    assert_eq!(regs.gpr[2], 2);

    reference.disconnect().unwrap();
    server.join().unwrap();
}

#[test]
fn test_continue_stops_at_breakpoint() {
    let (addr, server) = serve(FakeMips::new());
    let mut reference = connect(addr);

    reference.set_registers(&RegisterFile::at(ENTRY)).unwrap();
    reference.set_breakpoint(ENTRY + 0x10).unwrap();
    reference.continue_until_breakpoint().unwrap();
    reference.remove_breakpoint(ENTRY + 0x10).unwrap();
    let regs = reference.get_registers().unwrap();
    assert_eq!(regs.pc, ENTRY + 0x10);
    assert_eq!(regs.gpr[2], 4);

    reference.disconnect().unwrap();
    let target = server.join().unwrap();
    assert!(target.breakpoints.is_empty());
}

#[test]
fn test_program_exit_is_an_error() {
    let mut fake = FakeMips::new();
    fake.run_limit = 16;
    let (addr, server) = serve(fake);
    let mut reference = connect(addr);

    assert!(matches!(
        reference.continue_until_breakpoint(),
        Err(ReferenceError::Exited(_))
    ));
    drop(reference);
    let target = server.join().unwrap();
    assert!(matches!(
        target.disconnect,
        Some(DisconnectReason::TargetExited(0))
    ));
}

#[test]
fn test_read_word_is_little_endian() {
    let (addr, server) = serve(FakeMips::new().with_word(ENTRY, 0x4008_4800));
    let mut reference = connect(addr);

    assert_eq!(reference.read_word(ENTRY).unwrap(), 0x4008_4800);
    assert_eq!(reference.read_word(ENTRY + 4).unwrap(), 0);

    reference.disconnect().unwrap();
    server.join().unwrap();
}

#[test]
fn test_engine_over_gdb_stub() {
    let (addr, server) = serve(FakeMips::new());
    let reference = connect(addr);
    let dut = MockDut::new(counting_program(64), new_log());

    let mut config = EngineConfig::new(ENTRY, "kernel.elf");
    config.max_commits = Some(24);
    let mut engine = Engine::new(reference, dut, config, CancelToken::new());
    let outcome = engine.run().unwrap();
    let Outcome::Completed(stats) = outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert_eq!(stats.reference_steps, 24);

    let (mut reference, dut) = engine.into_parts();
    assert_eq!(dut.regs.gpr[2], 24);
    reference.disconnect().unwrap();
    let target = server.join().unwrap();
    assert_eq!(target.regs.pc, ENTRY + 24 * 4);
}
