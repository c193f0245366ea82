//! Reference Controller: drives the trusted instruction-accurate model.
//!
//! The model is controlled through its GDB stub. Every call blocks until the
//! model answers, bounded by a per-call timeout and the session
//! [`CancelToken`](crate::CancelToken).

mod gdb;
mod packet;

use std::time::Duration;

use thiserror::Error;

use crate::regs::RegisterFile;

pub use gdb::{ConnectOptions, GdbReference};
pub use packet::{PacketError, decode_hex, encode_hex};

/// Reference controller error.
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reference model unreachable at {addr} after {after:?}")]
    Unreachable { addr: String, after: Duration },

    #[error("reference model did not answer `{op}` within {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("`{op}` cancelled")]
    Cancelled { op: &'static str },

    #[error("malformed packet: {0}")]
    Packet(#[from] PacketError),

    #[error("reference rejected packet `{op}`")]
    Nak { op: &'static str },

    #[error("reference returned error E{code:02x} for `{op}`")]
    ErrorReply { op: &'static str, code: u8 },

    #[error("unexpected reply to `{op}`: {reply}")]
    UnexpectedReply { op: &'static str, reply: String },

    #[error("reference model exited ({0})")]
    Exited(String),

    #[error("register block does not match the MIPS layout ({0} bytes)")]
    RegisterLayout(usize),

    #[error("connection closed by reference model")]
    Closed,
}

/// Synchronous control of the reference model.
///
/// `get_registers` reports the program counter of the *next* instruction
/// to execute; use [`RegisterFile::retired_pc`] for the one that just ran.
pub trait Reference {
    fn set_registers(&mut self, regs: &RegisterFile) -> Result<(), ReferenceError>;

    fn get_registers(&mut self) -> Result<RegisterFile, ReferenceError>;

    fn set_breakpoint(&mut self, addr: u32) -> Result<(), ReferenceError>;

    fn remove_breakpoint(&mut self, addr: u32) -> Result<(), ReferenceError>;

    /// Free-run until a breakpoint is hit.
    fn continue_until_breakpoint(&mut self) -> Result<(), ReferenceError>;

    /// Retire exactly one instruction.
    fn single_step(&mut self) -> Result<(), ReferenceError>;

    /// Read one little-endian word of guest memory.
    fn read_word(&mut self, addr: u32) -> Result<u32, ReferenceError>;

    fn disconnect(&mut self) -> Result<(), ReferenceError>;
}
