//! GDB remote serial protocol framing.
//!
//! Packets are `$<payload>#<checksum>` where the checksum is the modulo-256
//! sum of the payload bytes as two hex digits.

use thiserror::Error;

/// Framing and encoding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("checksum mismatch: expected {expected:02x}, computed {computed:02x}")]
    Checksum { expected: u8, computed: u8 },

    #[error("invalid hex digit 0x{0:02x}")]
    InvalidHex(u8),

    #[error("odd-length hex payload")]
    OddLength,

    #[error("run-length marker without a preceding byte")]
    DanglingRunLength,

    #[error("escape at end of packet")]
    DanglingEscape,
}

const ESCAPE: u8 = b'}';
const RUN_LENGTH: u8 = b'*';

#[must_use]
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Frame `payload` for the wire, escaping bytes the protocol reserves.
#[must_use]
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len());
    for &b in payload {
        if matches!(b, b'$' | b'#' | ESCAPE | RUN_LENGTH) {
            body.push(ESCAPE);
            body.push(b ^ 0x20);
        } else {
            body.push(b);
        }
    }
    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(b'$');
    out.extend_from_slice(&body);
    out.push(b'#');
    out.extend_from_slice(format!("{:02x}", checksum(&body)).as_bytes());
    out
}

/// Verify the checksum of a received packet body and expand it.
pub fn unframe(body: &[u8], expected: u8) -> Result<Vec<u8>, PacketError> {
    let computed = checksum(body);
    if computed != expected {
        return Err(PacketError::Checksum { expected, computed });
    }
    expand(body)
}

/// Undo `}` escapes and `*` run-length encoding.
fn expand(body: &[u8]) -> Result<Vec<u8>, PacketError> {
    let mut out = Vec::with_capacity(body.len());
    let mut iter = body.iter().copied();
    while let Some(b) = iter.next() {
        match b {
            ESCAPE => {
                let next = iter.next().ok_or(PacketError::DanglingEscape)?;
                out.push(next ^ 0x20);
            }
            RUN_LENGTH => {
                let count = iter.next().ok_or(PacketError::DanglingRunLength)?;
                let last = *out.last().ok_or(PacketError::DanglingRunLength)?;
                // The count byte encodes `repeats + 29`.
                let repeats = usize::from(count.saturating_sub(29));
                out.extend(std::iter::repeat_n(last, repeats));
            }
            _ => out.push(b),
        }
    }
    Ok(out)
}

pub fn hex_digit(c: u8) -> Result<u8, PacketError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(PacketError::InvalidHex(c)),
    }
}

/// Decode a hex string. Unavailable-register markers (`xx`) decode as zero.
pub fn decode_hex(hex: &[u8]) -> Result<Vec<u8>, PacketError> {
    if hex.len() % 2 != 0 {
        return Err(PacketError::OddLength);
    }
    hex.chunks_exact(2)
        .map(|pair| match pair {
            [b'x', b'x'] => Ok(0),
            [hi, lo] => Ok((hex_digit(*hi)? << 4) | hex_digit(*lo)?),
            _ => unreachable!("chunks_exact(2) yields pairs"),
        })
        .collect()
}

#[must_use]
pub fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
