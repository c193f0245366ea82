//! MIPS32 instruction definitions for the differential tester.
//!
//! Decoding only goes as far as field extraction. The classifier predicates
//! steer stepping and diagnostics; nothing here executes instructions.

mod addr;
mod classify;
mod decode;
mod regs;

pub use addr::AddressSet;
pub use classify::*;
pub use decode::*;
pub use regs::*;
