//! MIPS32 instruction field extraction.

/// `SPECIAL` opcode group, selected by `func`.
pub const OP_SPECIAL: u8 = 0x00;
/// `REGIMM` opcode group, selected by `rt`.
pub const OP_REGIMM: u8 = 0x01;
pub const OP_J: u8 = 0x02;
pub const OP_JAL: u8 = 0x03;
pub const OP_BEQ: u8 = 0x04;
pub const OP_BGTZ: u8 = 0x07;
pub const OP_COP0: u8 = 0x10;
pub const OP_BEQL: u8 = 0x14;
pub const OP_BGTZL: u8 = 0x17;
pub const OP_LW: u8 = 0x23;
pub const OP_SW: u8 = 0x2b;

pub const FUNC_JR: u8 = 0x08;
pub const FUNC_JALR: u8 = 0x09;

/// `rs` value selecting MFC0 inside the COP0 group.
pub const COP0_MF: u8 = 0x00;

/// Decoded instruction fields.
///
/// Every field is extracted regardless of format; callers pick the ones
/// that are meaningful for the opcode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Inst {
    /// Raw instruction word.
    pub raw: u32,
    pub op: u8,
    pub rs: u8,
    pub rt: u8,
    pub rd: u8,
    pub shamt: u8,
    pub func: u8,
    /// Low 16 bits, zero-extended.
    pub imm: u16,
    /// Low 16 bits, sign-extended.
    pub simm: i32,
    /// 26-bit jump target field.
    pub target: u32,
}

impl Inst {
    /// Split a 32-bit instruction word into its fields.
    #[must_use]
    pub const fn decode(raw: u32) -> Self {
        let imm = (raw & 0xffff) as u16;
        Self {
            raw,
            op: (raw >> 26) as u8,
            rs: ((raw >> 21) & 0x1f) as u8,
            rt: ((raw >> 16) & 0x1f) as u8,
            rd: ((raw >> 11) & 0x1f) as u8,
            shamt: ((raw >> 6) & 0x1f) as u8,
            func: (raw & 0x3f) as u8,
            imm,
            simm: imm as i16 as i32,
            target: raw & 0x03ff_ffff,
        }
    }
}

impl From<u32> for Inst {
    fn from(raw: u32) -> Self {
        Self::decode(raw)
    }
}
