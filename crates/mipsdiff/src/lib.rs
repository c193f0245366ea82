//! Lockstep differential testing of a pipelined MIPS core.
//!
//! A device under test (a cycle-stepped simulation loaded from a shared
//! library) and a reference model (QEMU behind its GDB stub) execute the
//! same program. After every DUT cycle that commits instructions the
//! reference retires the same number and the register files are compared.
//!
//! ```ignore
//! use mipsdiff::{CancelToken, ConnectOptions, DutLibrary, Engine, EngineConfig, GdbReference};
//!
//! let cancel = CancelToken::new();
//! let options = ConnectOptions { cancel: cancel.clone(), ..ConnectOptions::default() };
//! let reference = GdbReference::connect("127.0.0.1:1234".parse()?, options)?;
//! let dut = DutLibrary::load("libcore.so".as_ref())?;
//! let config = EngineConfig::new(0x8000_0000, "kernel.elf");
//! let outcome = Engine::new(reference, dut, config, cancel).run()?;
//! ```

mod cancel;
pub mod dut;
pub mod elf;
pub mod engine;
mod error;
pub mod metrics;
pub mod reference;
mod regs;
pub mod supervisor;

pub use cancel::{CancelToken, Deadline, install_interrupt_handler};
pub use dut::{Dut, DutError, DutLibrary, SyncKind};
pub use elf::{ElfError, read_entry};
pub use engine::{
    Comparison, Engine, EngineConfig, Failure, FailureKind, Outcome, RegMismatch, SessionStats,
    Suspect, SuspectTag, compare_registers,
};
pub use error::{Error, Result};
pub use reference::{ConnectOptions, GdbReference, Reference, ReferenceError};
pub use regs::{CommittedPcs, RECENT_PCS, RegisterDump, RegisterFile};
pub use supervisor::{
    LauncherExit, ReferenceCommand, ReferenceProcess, SessionDescriptor, SupervisorError,
    run_launcher,
};

pub use mipsdiff_isa as isa;
