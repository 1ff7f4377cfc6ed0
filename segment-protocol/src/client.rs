//! Client drivers for both packet families.
//!
//! [`run_conversation`] plays the fixed five-segment conversation, sending the
//! same payload as segments 1 through 5 and optionally corrupting one of them
//! with a [`FaultMode`].  The first Reject or unexpected reply ends the
//! conversation with an error.
//!
//! [`request_connection`] asks the authorization server about one subscriber.

use thiserror::Error;

use crate::auth_packet::{decode_connection_result, AuthResult, ConnectionRequest};
use crate::packet::{decode_segment_response, encode_segment, FaultMode, PacketError, RejectReason, Response};
use crate::sequencer::DEFAULT_CONVERSATION_LENGTH;
use crate::session::{Session, SessionError};

/// Client id used when none is given on the command line.
pub const DEFAULT_CLIENT_ID: u8 = 7;

/// Segment that receives the injected fault unless told otherwise.
pub const DEFAULT_FAULT_SEGMENT: u8 = 3;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server refused a segment.  `echoed_segment_no` is the number the
    /// server read from the wire, which differs under sequence faults.
    #[error("segment {segment_no} rejected: {reason} (server saw segment {echoed_segment_no})")]
    Rejected {
        segment_no: u8,
        echoed_segment_no: u8,
        reason: RejectReason,
    },
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Parameters of one five-segment conversation.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub client_id: u8,
    pub payload: Vec<u8>,
    pub fault: FaultMode,
    /// Segment number the fault is applied to.
    pub fault_at: u8,
}

impl Conversation {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID,
            payload: payload.into(),
            fault: FaultMode::None,
            fault_at: DEFAULT_FAULT_SEGMENT,
        }
    }

    pub fn with_fault(mut self, fault: FaultMode, fault_at: u8) -> Self {
        self.fault = fault;
        self.fault_at = fault_at;
        self
    }

    pub fn with_client_id(mut self, client_id: u8) -> Self {
        self.client_id = client_id;
        self
    }
}

/// Send segments 1..=5 and return the acknowledged segment numbers.
///
/// Every segment is checked for an Ack before the next is sent; a Reject
/// is surfaced as [`ClientError::Rejected`].
pub async fn run_conversation(
    session: &Session,
    conversation: &Conversation,
) -> Result<Vec<u8>, ClientError> {
    let mut acked = Vec::with_capacity(usize::from(DEFAULT_CONVERSATION_LENGTH));
    for segment_no in 1..=DEFAULT_CONVERSATION_LENGTH {
        let fault = if segment_no == conversation.fault_at {
            conversation.fault
        } else {
            FaultMode::None
        };
        let request = encode_segment(&conversation.payload, conversation.client_id, segment_no, fault)?;
        let reply = session.exchange(&request).await?;

        match decode_segment_response(&reply, conversation.client_id, segment_no)? {
            Response::Ack => {
                log::info!("[client] segment {segment_no} acknowledged");
                acked.push(segment_no);
            }
            Response::Reject(rejection) => {
                log::warn!(
                    "[client] segment {segment_no} rejected: {}",
                    rejection.reason
                );
                return Err(ClientError::Rejected {
                    segment_no,
                    echoed_segment_no: rejection.segment_no,
                    reason: rejection.reason,
                });
            }
        }
    }
    Ok(acked)
}

/// Ask whether `subscriber_no` may connect with `tech`.
///
/// Out-of-range input fails before anything is sent.
pub async fn request_connection(
    session: &Session,
    client_id: u8,
    subscriber_no: u64,
    tech: u8,
) -> Result<AuthResult, ClientError> {
    let request = ConnectionRequest::new(client_id, subscriber_no, tech)?;
    send_connection_request(session, &request).await
}

/// Send an already validated request and decode the server's verdict.
pub async fn send_connection_request(
    session: &Session,
    request: &ConnectionRequest,
) -> Result<AuthResult, ClientError> {
    log::info!(
        "[client] subscriber {}, tech {}",
        request.subscriber_no,
        request.tech
    );
    let bytes = request.encode();
    let reply = session.exchange(&bytes).await?;
    let result = decode_connection_result(&reply, &bytes)?;
    log::info!("[client] {result}");
    Ok(result)
}
