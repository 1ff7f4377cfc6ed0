//! Wire-format definitions for the connection-request packet family.
//!
//! A client asks whether a subscriber may connect with a given technology
//! generation; the server answers with the request echoed back verbatim
//! except for the type byte, which carries the verdict.
//!
//! # Wire format (both directions are exactly [`CONNECTION_PACKET_LEN`] bytes)
//!
//! ```text
//!  offset  0  1  2         3  4     5   6   7     8..11               12 13
//! Request  FF FF clientId  FF F8    01  05  tech  subscriberNo (BE)   FF FF
//! Result   FF FF clientId  FF F9|FA|FB ... echoed from the request ...
//! ```

use std::fmt;

use crate::packet::{
    message_type, PacketError, MARKER, OFF_CLIENT_ID, OFF_PAYLOAD_LEN, OFF_SEGMENT_NO, OFF_TYPE,
    OFF_TYPE_MARKER,
};

/// Fixed length of both the request and the result packet.
pub const CONNECTION_PACKET_LEN: usize = 14;

/// Lowest accepted technology code.
pub const MIN_TECH: u8 = 2;
/// Highest accepted technology code.
pub const MAX_TECH: u8 = 5;

/// A connection request always claims to be segment 1.
const REQUEST_SEGMENT_NO: u8 = 0x01;
/// tech (1) + subscriber number (4).
const REQUEST_PAYLOAD_LEN: u8 = 0x05;

const OFF_TECH: usize = 7;
const OFF_SUBSCRIBER_NO: usize = 8;

/// Verdict carried in the type byte of a connection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthResult {
    /// The subscriber exists but is unpaid or registered for another tech.
    NotPaid,
    /// No record for this subscriber number.
    NotFound,
    Accepted,
    /// A type byte this client does not understand.
    Unknown(u8),
}

impl AuthResult {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0xF9 => AuthResult::NotPaid,
            0xFA => AuthResult::NotFound,
            0xFB => AuthResult::Accepted,
            other => AuthResult::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            AuthResult::NotPaid => 0xF9,
            AuthResult::NotFound => 0xFA,
            AuthResult::Accepted => 0xFB,
            AuthResult::Unknown(v) => v,
        }
    }
}

impl fmt::Display for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthResult::Accepted => write!(f, "connection accepted"),
            AuthResult::NotPaid => write!(f, "connection rejected: service not paid"),
            AuthResult::NotFound => write!(f, "connection rejected: subscriber number not found"),
            AuthResult::Unknown(v) => write!(f, "unknown response type {v:#04x}"),
        }
    }
}

/// A validated connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub client_id: u8,
    pub tech: u8,
    pub subscriber_no: u32,
}

impl ConnectionRequest {
    /// Build a request, refusing out-of-range input before any packet exists.
    ///
    /// `subscriber_no` is taken as `u64` so callers parsing user input can
    /// hand it over unchecked; anything above `u32::MAX` is rejected.
    pub fn new(client_id: u8, subscriber_no: u64, tech: u8) -> Result<Self, PacketError> {
        if !(MIN_TECH..=MAX_TECH).contains(&tech) {
            return Err(PacketError::OutOfRange(format!(
                "tech {tech} not in {MIN_TECH}..={MAX_TECH}"
            )));
        }
        let subscriber_no = u32::try_from(subscriber_no).map_err(|_| {
            PacketError::OutOfRange(format!(
                "subscriber number {subscriber_no} exceeds {}",
                u32::MAX
            ))
        })?;
        Ok(Self {
            client_id,
            tech,
            subscriber_no,
        })
    }

    /// Serialise into the fixed 14-byte wire form.
    pub fn encode(&self) -> [u8; CONNECTION_PACKET_LEN] {
        let mut buf = [0u8; CONNECTION_PACKET_LEN];
        buf[0] = MARKER;
        buf[1] = MARKER;
        buf[OFF_CLIENT_ID] = self.client_id;
        buf[OFF_TYPE_MARKER] = MARKER;
        buf[OFF_TYPE] = message_type::CONNECT_REQUEST;
        buf[OFF_SEGMENT_NO] = REQUEST_SEGMENT_NO;
        buf[OFF_PAYLOAD_LEN] = REQUEST_PAYLOAD_LEN;
        buf[OFF_TECH] = self.tech;
        buf[OFF_SUBSCRIBER_NO..OFF_SUBSCRIBER_NO + 4]
            .copy_from_slice(&self.subscriber_no.to_be_bytes());
        buf[12] = MARKER;
        buf[13] = MARKER;
        buf
    }

    /// Parse a request on the server side.
    ///
    /// Only the framing is checked; the tech byte is passed through as-is so
    /// the subscriber lookup decides what an unusual value means.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() != CONNECTION_PACKET_LEN {
            return Err(PacketError::MalformedRequest(format!(
                "request is {} bytes, expected {CONNECTION_PACKET_LEN}",
                bytes.len()
            )));
        }
        if bytes[0] != MARKER
            || bytes[1] != MARKER
            || bytes[OFF_TYPE_MARKER] != MARKER
            || bytes[OFF_TYPE] != message_type::CONNECT_REQUEST
            || bytes[OFF_PAYLOAD_LEN] != REQUEST_PAYLOAD_LEN
            || bytes[12] != MARKER
            || bytes[13] != MARKER
        {
            return Err(PacketError::MalformedRequest("wrong request packet format".into()));
        }
        let mut sub = [0u8; 4];
        sub.copy_from_slice(&bytes[OFF_SUBSCRIBER_NO..OFF_SUBSCRIBER_NO + 4]);
        Ok(Self {
            client_id: bytes[OFF_CLIENT_ID],
            tech: bytes[OFF_TECH],
            subscriber_no: u32::from_be_bytes(sub),
        })
    }
}

/// Build the server's reply: `request` echoed with byte 4 set to `result`.
pub fn encode_connection_result(
    request: &[u8; CONNECTION_PACKET_LEN],
    result: AuthResult,
) -> [u8; CONNECTION_PACKET_LEN] {
    let mut buf = *request;
    buf[OFF_TYPE] = result.to_u8();
    buf
}

/// Check a connection result against the request that produced it.
///
/// Every byte except the type byte must be an exact echo of `request`.
pub fn decode_connection_result(response: &[u8], request: &[u8]) -> Result<AuthResult, PacketError> {
    if response.len() != CONNECTION_PACKET_LEN || request.len() != CONNECTION_PACKET_LEN {
        return Err(PacketError::MalformedResponse(format!(
            "response length {} not expected",
            response.len()
        )));
    }
    let echo_differs = response
        .iter()
        .zip(request)
        .enumerate()
        .any(|(i, (r, q))| i != OFF_TYPE && r != q);
    if echo_differs {
        return Err(PacketError::MalformedResponse(
            "response does not echo the request".into(),
        ));
    }
    Ok(AuthResult::from_u8(response[OFF_TYPE]))
}
