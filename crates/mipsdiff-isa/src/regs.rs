//! Register file constants.

/// Number of general-purpose registers.
pub const NUM_GPRS: usize = 32;

/// Width of one instruction in bytes.
pub const INST_BYTES: u32 = 4;

/// Hardwired zero register.
pub const REG_ZERO: usize = 0;

/// Conventional o32 register aliases, indexed by register number.
pub const REG_NAMES: [&str; NUM_GPRS] = [
    "0", "at", "v0", "v1", "a0", "a1", "a2", "a3", //
    "t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7", //
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", //
    "t8", "t9", "k0", "k1", "gp", "sp", "fp", "ra",
];

/// Alias for a register index, or `"?"` when out of range.
#[must_use]
pub fn reg_name(index: usize) -> &'static str {
    REG_NAMES.get(index).copied().unwrap_or("?")
}
