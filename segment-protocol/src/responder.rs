//! Builds the server's replies.
//!
//! - Segment family: an Ack for an accepted segment, a Reject with the
//!   matching reason code for any violation.
//! - Connection-request family: the request echoed back with its type byte
//!   replaced by the [`AuthResult`] of a subscriber lookup.

use crate::auth_packet::{encode_connection_result, AuthResult, ConnectionRequest, CONNECTION_PACKET_LEN};
use crate::packet::{encode_ack, encode_reject, PacketError, RejectReason};
use crate::subscriber::SubscriberTable;
use crate::validator::Inspection;

/// Reply to one inspected segment.
pub fn respond(inspection: &Inspection<'_>) -> Vec<u8> {
    match inspection.verdict {
        Ok(_) => encode_ack(inspection.client_id, inspection.segment_no),
        Err(violation) => encode_reject(
            inspection.client_id,
            RejectReason::from(violation),
            inspection.segment_no,
        ),
    }
}

/// Decide whether `subscriber_no` may connect with `tech`.
///
/// The table is scanned in order.  A record that matches subscriber, tech
/// and is paid wins immediately.  A record that only matches the subscriber
/// number yields `NotPaid` unless a later record is accepted.  With no
/// matching subscriber number the answer is `NotFound`.
pub fn authorize(table: &SubscriberTable, subscriber_no: u32, tech: u8) -> AuthResult {
    let mut result = AuthResult::NotFound;
    for record in table.records().iter().filter(|r| r.subscriber_no == subscriber_no) {
        if record.tech == tech && record.paid {
            return AuthResult::Accepted;
        }
        result = AuthResult::NotPaid;
    }
    result
}

/// Parse a connection request and build the echoed result.
pub fn respond_to_connection_request(
    bytes: &[u8],
    table: &SubscriberTable,
) -> Result<(ConnectionRequest, AuthResult, [u8; CONNECTION_PACKET_LEN]), PacketError> {
    let request = ConnectionRequest::decode(bytes)?;
    let result = authorize(table, request.subscriber_no, request.tech);
    let mut echoed = [0u8; CONNECTION_PACKET_LEN];
    echoed.copy_from_slice(bytes);
    Ok((request, result, encode_connection_result(&echoed, result)))
}
