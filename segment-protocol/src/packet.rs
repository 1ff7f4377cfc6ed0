//! Wire-format definitions for the segment packet family.
//!
//! Every datagram exchanged by the segment client and server is one of:
//! - a **Segment** packet (client → server) carrying part of a payload,
//! - an **Ack** packet (server → client) confirming one segment,
//! - a **Reject** packet (server → client) naming why a segment was refused.
//!
//! This module is responsible for:
//! - Defining the on-wire binary layout and marker constants.
//! - Serialising segments (optionally corrupted by a [`FaultMode`]) and the
//!   server's replies into byte buffers ready for transmission.
//! - Deserialising the server's replies on the client, returning
//!   [`PacketError::MalformedResponse`] for anything unexpected.
//!
//! No I/O happens here — this is pure data transformation.  Server-side
//! classification of incoming segments lives in [`crate::validator`].
//!
//! # Wire format
//!
//! ```text
//!  offset   0    1    2         3    4    5          6           7 ..          n-2  n-1
//! Segment  FF   FF   clientId  FF   F1   segmentNo  payloadLen  payload ...   FF   FF
//! Ack      FF   FF   clientId  FF   F2   segmentNo  FF          FF
//! Reject   FF   FF   clientId  FF   F3   FF         reason      segmentNo FF FF
//! ```
//!
//! A well-formed segment is [`SEGMENT_OVERHEAD`] + `payloadLen` bytes long.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Marker byte used for the start marker, end marker and type prefix.
pub const MARKER: u8 = 0xFF;

/// Message-type byte values (offset 4).
pub mod message_type {
    /// Client payload segment.
    pub const SEGMENT: u8 = 0xF1;
    /// Positive acknowledgement of one segment.
    pub const ACK: u8 = 0xF2;
    /// Negative acknowledgement carrying a reason code.
    pub const REJECT: u8 = 0xF3;
    /// Subscriber connection request.
    pub const CONNECT_REQUEST: u8 = 0xF8;
}

/// Bytes before the payload: start marker, client id, type marker, type,
/// segment number, payload length.
pub const HEADER_LEN: usize = 7;

/// Header plus 2-byte end marker.
pub const SEGMENT_OVERHEAD: usize = HEADER_LEN + 2;

/// The payload length field is a single byte.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Largest well-formed segment.
pub const MAX_PACKET_LEN: usize = SEGMENT_OVERHEAD + MAX_PAYLOAD_LEN;

/// Fixed length of an Ack packet.
pub const ACK_LEN: usize = 8;

/// Fixed length of a Reject packet.
pub const REJECT_LEN: usize = 10;

// Byte offsets shared by every packet in the family.
pub(crate) const OFF_CLIENT_ID: usize = 2;
pub(crate) const OFF_TYPE_MARKER: usize = 3;
pub(crate) const OFF_TYPE: usize = 4;
pub(crate) const OFF_SEGMENT_NO: usize = 5;
pub(crate) const OFF_PAYLOAD_LEN: usize = 6;

// Reject-only offsets.
const OFF_REASON_MARKER: usize = 5;
const OFF_REASON: usize = 6;
const OFF_REJECT_SEGMENT_NO: usize = 7;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while building or parsing packets of either family.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// The peer sent bytes that do not form the expected reply.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The peer sent bytes that do not form a valid request.
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    /// A caller-supplied field is outside its permitted range.
    #[error("value out of range: {0}")]
    OutOfRange(String),
    /// The payload does not fit into a single segment.
    #[error("payload of {0} bytes exceeds the 255-byte limit")]
    PayloadTooLarge(usize),
}

// ---------------------------------------------------------------------------
// Reject reasons
// ---------------------------------------------------------------------------

/// Reason code carried in a Reject packet (offset 6).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    OutOfSequence = 0xF4,
    LengthMismatch = 0xF5,
    MissingTerminator = 0xF6,
    Duplicate = 0xF7,
    /// Anything that is not one of the specific protocol violations.
    Unknown = 0xF8,
}

impl RejectReason {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0xF4 => RejectReason::OutOfSequence,
            0xF5 => RejectReason::LengthMismatch,
            0xF6 => RejectReason::MissingTerminator,
            0xF7 => RejectReason::Duplicate,
            0xF8 => RejectReason::Unknown,
            _ => return None,
        })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::OutOfSequence => write!(f, "received packet out of sequence"),
            RejectReason::LengthMismatch => write!(f, "packet length mismatch"),
            RejectReason::MissingTerminator => write!(f, "end of packet missing"),
            RejectReason::Duplicate => write!(f, "duplicate packet"),
            RejectReason::Unknown => write!(f, "unspecified packet error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Deliberate corruption applied by [`encode_segment`] so a client can
/// exercise the server's validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultMode {
    /// Encode faithfully.
    #[default]
    None,
    /// Encode `segment_no + 1`.
    BadSequence,
    /// Encode `payload_len - 1` while still writing every payload byte.
    BadLength,
    /// Omit the 2-byte end marker.
    MissingTerminator,
    /// Encode `segment_no - 1`.
    Duplicate,
}

impl FromStr for FaultMode {
    type Err = String;

    /// Accepts the one-letter flags `n`, `s`, `l`, `e`, `d` as well as the
    /// spelled-out names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "n" | "none" => Ok(FaultMode::None),
            "s" | "bad-sequence" | "sequence" => Ok(FaultMode::BadSequence),
            "l" | "bad-length" | "length" => Ok(FaultMode::BadLength),
            "e" | "missing-terminator" | "terminator" => Ok(FaultMode::MissingTerminator),
            "d" | "duplicate" => Ok(FaultMode::Duplicate),
            _ => Err(format!("unknown fault mode: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Write the 5-byte common prefix: start marker, client id, type marker, type.
fn put_prefix(buf: &mut Vec<u8>, client_id: u8, kind: u8) {
    buf.extend_from_slice(&[MARKER, MARKER, client_id, MARKER, kind]);
}

/// Serialise one segment of `payload`.
///
/// The result is `SEGMENT_OVERHEAD + payload.len()` bytes, or two bytes
/// fewer under [`FaultMode::MissingTerminator`].  Payloads longer than
/// [`MAX_PAYLOAD_LEN`] are refused rather than truncated.
pub fn encode_segment(
    payload: &[u8],
    client_id: u8,
    segment_no: u8,
    fault: FaultMode,
) -> Result<Vec<u8>, PacketError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(PacketError::PayloadTooLarge(payload.len()));
    }
    let payload_len = payload.len() as u8;

    let wire_segment_no = match fault {
        FaultMode::BadSequence => segment_no.wrapping_add(1),
        FaultMode::Duplicate if segment_no > 1 => segment_no - 1,
        _ => segment_no,
    };
    let wire_payload_len = match fault {
        FaultMode::BadLength if payload_len > 1 => payload_len - 1,
        _ => payload_len,
    };

    let mut buf = Vec::with_capacity(SEGMENT_OVERHEAD + payload.len());
    put_prefix(&mut buf, client_id, message_type::SEGMENT);
    buf.push(wire_segment_no);
    buf.push(wire_payload_len);
    buf.extend_from_slice(payload);
    if fault != FaultMode::MissingTerminator {
        buf.extend_from_slice(&[MARKER, MARKER]);
    }
    Ok(buf)
}

/// Serialise an Ack for `segment_no`.
pub fn encode_ack(client_id: u8, segment_no: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ACK_LEN);
    put_prefix(&mut buf, client_id, message_type::ACK);
    buf.extend_from_slice(&[segment_no, MARKER, MARKER]);
    buf
}

/// Serialise a Reject for `segment_no` with the given reason.
pub fn encode_reject(client_id: u8, reason: RejectReason, segment_no: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(REJECT_LEN);
    put_prefix(&mut buf, client_id, message_type::REJECT);
    buf.extend_from_slice(&[MARKER, reason.to_u8(), segment_no, MARKER, MARKER]);
    buf
}

// ---------------------------------------------------------------------------
// Decoding (client side)
// ---------------------------------------------------------------------------

/// A decoded Reject packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub client_id: u8,
    pub reason: RejectReason,
    pub segment_no: u8,
}

/// The server's reply to one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ack,
    Reject(Rejection),
}

fn malformed(what: impl Into<String>) -> PacketError {
    PacketError::MalformedResponse(what.into())
}

/// Check the start marker and type prefix shared by Ack and Reject.
fn check_prefix(bytes: &[u8], kind: u8) -> Result<(), PacketError> {
    if bytes.len() <= OFF_TYPE {
        return Err(malformed(format!("{} bytes is too short", bytes.len())));
    }
    if bytes[0] != MARKER || bytes[1] != MARKER {
        return Err(malformed("bad start marker"));
    }
    if bytes[OFF_TYPE_MARKER] != MARKER || bytes[OFF_TYPE] != kind {
        return Err(malformed(format!("unexpected type {:#04x}", bytes[OFF_TYPE])));
    }
    Ok(())
}

/// Verify that `bytes` is an Ack for exactly this client and segment.
pub fn decode_ack(
    bytes: &[u8],
    expected_client_id: u8,
    expected_segment_no: u8,
) -> Result<(), PacketError> {
    check_prefix(bytes, message_type::ACK)?;
    if bytes.len() != ACK_LEN {
        return Err(malformed(format!("ack is {} bytes, expected {ACK_LEN}", bytes.len())));
    }
    if bytes[OFF_CLIENT_ID] != expected_client_id {
        return Err(malformed(format!(
            "ack for client {} while expecting {expected_client_id}",
            bytes[OFF_CLIENT_ID]
        )));
    }
    if bytes[OFF_SEGMENT_NO] != expected_segment_no {
        return Err(malformed(format!(
            "acknowledge packet out of order: got {}, expected {expected_segment_no}",
            bytes[OFF_SEGMENT_NO]
        )));
    }
    if bytes[6] != MARKER || bytes[7] != MARKER {
        return Err(malformed("bad end marker"));
    }
    Ok(())
}

/// Parse a Reject packet.
pub fn decode_reject(bytes: &[u8]) -> Result<Rejection, PacketError> {
    check_prefix(bytes, message_type::REJECT)?;
    if bytes.len() != REJECT_LEN {
        return Err(malformed(format!(
            "reject is {} bytes, expected {REJECT_LEN}",
            bytes.len()
        )));
    }
    if bytes[OFF_REASON_MARKER] != MARKER {
        return Err(malformed("missing reason marker"));
    }
    let reason = RejectReason::from_u8(bytes[OFF_REASON])
        .ok_or_else(|| malformed(format!("unknown reason code {:#04x}", bytes[OFF_REASON])))?;
    if bytes[8] != MARKER || bytes[9] != MARKER {
        return Err(malformed("bad end marker"));
    }
    Ok(Rejection {
        client_id: bytes[OFF_CLIENT_ID],
        reason,
        segment_no: bytes[OFF_REJECT_SEGMENT_NO],
    })
}

/// Decode the server's reply to segment `segment_no` sent by `client_id`.
///
/// Dispatches on the type byte: Ack replies are checked against the expected
/// client and segment; Reject replies must come back to the same client.
pub fn decode_segment_response(
    bytes: &[u8],
    client_id: u8,
    segment_no: u8,
) -> Result<Response, PacketError> {
    match bytes.get(OFF_TYPE) {
        Some(&message_type::ACK) => decode_ack(bytes, client_id, segment_no).map(|()| Response::Ack),
        Some(&message_type::REJECT) => {
            let rejection = decode_reject(bytes)?;
            if rejection.client_id != client_id {
                return Err(malformed(format!(
                    "reject for client {} while expecting {client_id}",
                    rejection.client_id
                )));
            }
            Ok(Response::Reject(rejection))
        }
        Some(other) => Err(malformed(format!("unexpected type {other:#04x}"))),
        None => Err(malformed(format!("{} bytes is too short", bytes.len()))),
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Displays a packet as space-separated hex bytes, e.g. `ff ff 07 ff f2`.
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
