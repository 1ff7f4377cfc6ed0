//! Server-side classification of incoming Segment packets.
//!
//! [`inspect`] looks at one raw datagram and the conversation's last accepted
//! segment number and decides, in a fixed order, what is wrong with it:
//!
//! 1. start or type markers malformed (or too short for a header) → [`Violation::Malformed`]
//! 2. segment number is not `last + 1` → [`Violation::Duplicate`] when it
//!    equals `last`, otherwise [`Violation::OutOfSequence`]
//! 3. last two bytes are not the end marker → [`Violation::MissingTerminator`]
//! 4. declared payload length disagrees with the datagram → [`Violation::LengthMismatch`]
//!
//! The first failing check wins.  A sequencing problem therefore hides a
//! missing terminator, and a missing terminator hides a length mismatch.
//!
//! This module only reads; sequence state is updated by
//! [`crate::sequencer::Sequencer::record`].

use std::fmt;

use crate::packet::{
    message_type, RejectReason, HEADER_LEN, MARKER, OFF_CLIENT_ID, OFF_PAYLOAD_LEN,
    OFF_SEGMENT_NO, OFF_TYPE, OFF_TYPE_MARKER, SEGMENT_OVERHEAD,
};

/// A protocol violation found in an incoming segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    OutOfSequence,
    LengthMismatch,
    MissingTerminator,
    Duplicate,
    /// Not a segment packet at all.
    Malformed,
}

impl From<Violation> for RejectReason {
    fn from(v: Violation) -> Self {
        match v {
            Violation::OutOfSequence => RejectReason::OutOfSequence,
            Violation::LengthMismatch => RejectReason::LengthMismatch,
            Violation::MissingTerminator => RejectReason::MissingTerminator,
            Violation::Duplicate => RejectReason::Duplicate,
            Violation::Malformed => RejectReason::Unknown,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::OutOfSequence => write!(f, "out of sequence"),
            Violation::LengthMismatch => write!(f, "length mismatch"),
            Violation::MissingTerminator => write!(f, "missing terminator"),
            Violation::Duplicate => write!(f, "duplicate"),
            Violation::Malformed => write!(f, "malformed"),
        }
    }
}

/// The outcome of inspecting one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection<'a> {
    /// Client id from offset 2, or 0 when the datagram is too short to carry one.
    pub client_id: u8,
    /// Segment number as received (offset 5), or `last_segment_no` for a malformed datagram.
    pub segment_no: u8,
    /// The payload on success.
    pub verdict: Result<&'a [u8], Violation>,
}

impl Inspection<'_> {
    pub fn is_ok(&self) -> bool {
        self.verdict.is_ok()
    }

    pub fn violation(&self) -> Option<Violation> {
        self.verdict.err()
    }
}

/// Classify `buf` against the conversation's `last_segment_no`.
pub fn inspect(buf: &[u8], last_segment_no: u8) -> Inspection<'_> {
    let client_id = buf.get(OFF_CLIENT_ID).copied().unwrap_or(0);
    let verdict = classify(buf, last_segment_no);
    // A malformed datagram's segment byte means nothing; echo the conversation's own.
    let segment_no = match verdict {
        Err(Violation::Malformed) => last_segment_no,
        _ => buf[OFF_SEGMENT_NO],
    };
    Inspection {
        client_id,
        segment_no,
        verdict,
    }
}

fn classify(buf: &[u8], last: u8) -> Result<&[u8], Violation> {
    if buf.len() < HEADER_LEN
        || buf[0] != MARKER
        || buf[1] != MARKER
        || buf[OFF_TYPE_MARKER] != MARKER
        || buf[OFF_TYPE] != message_type::SEGMENT
    {
        return Err(Violation::Malformed);
    }

    let segment_no = buf[OFF_SEGMENT_NO];
    if segment_no != last.wrapping_add(1) {
        return Err(if segment_no == last {
            Violation::Duplicate
        } else {
            Violation::OutOfSequence
        });
    }

    let n = buf.len();
    if n < SEGMENT_OVERHEAD || buf[n - 1] != MARKER || buf[n - 2] != MARKER {
        return Err(Violation::MissingTerminator);
    }

    if usize::from(buf[OFF_PAYLOAD_LEN]) != n - SEGMENT_OVERHEAD {
        return Err(Violation::LengthMismatch);
    }

    Ok(&buf[HEADER_LEN..n - 2])
}
