//! Varint length-prefixed protobuf framing.
//!
//! Wire format, for both the pairing and the remote-control channel:
//! ```text
//! [length:varint][protobuf message:length bytes]
//! ```
//! The length is an unsigned LEB128 varint, identical to the length prefix
//! protobuf itself uses for embedded messages.

use prost::Message;
use thiserror::Error;

/// Largest frame accepted from a peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Errors that can occur during frame or report encoding/decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The varint length prefix is longer than 10 bytes or overflows.
    #[error("invalid varint length prefix")]
    InvalidVarint,

    /// The declared frame length exceeds [`MAX_FRAME_LEN`].
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// The payload could not be parsed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Varints ───────────────────────────────────────────────────────────────────

/// Appends `value` as an unsigned LEB128 varint.
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Reads a varint from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` ends mid-varint, otherwise the value and
/// the number of bytes consumed.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidVarint`] for prefixes longer than 10 bytes.
pub fn decode_varint(buf: &[u8]) -> Result<Option<(u64, usize)>, ProtocolError> {
    let mut value = 0u64;
    for (i, byte) in buf.iter().enumerate() {
        if i >= 10 {
            return Err(ProtocolError::InvalidVarint);
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= 10 {
        return Err(ProtocolError::InvalidVarint);
    }
    Ok(None)
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// Encodes `msg` with its varint length prefix.
pub fn encode_frame<M: Message>(msg: &M) -> Vec<u8> {
    msg.encode_length_delimited_to_vec()
}

/// Decodes one frame from the front of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet hold a complete frame, otherwise
/// the message and the total bytes consumed.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] or
/// [`ProtocolError::MalformedPayload`] on bad input.
pub fn decode_frame<M: Message + Default>(
    buf: &[u8],
) -> Result<Option<(M, usize)>, ProtocolError> {
    let Some((len, prefix)) = decode_varint(buf)? else {
        return Ok(None);
    };
    let len = usize::try_from(len).map_err(|_| ProtocolError::FrameTooLarge(usize::MAX))?;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let end = prefix + len;
    if buf.len() < end {
        return Ok(None);
    }
    let msg = M::decode(&buf[prefix..end])
        .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?;
    Ok(Some((msg, end)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
