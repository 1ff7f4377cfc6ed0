//! Server loops for both packet families.
//!
//! Both servers process one datagram at a time on a single task: receive,
//! classify, reply to the sender, repeat.  Nothing a client sends can stop
//! the loop; only a socket error ends it.
//!
//! - [`SegmentServer`] validates Segment packets against per-conversation
//!   sequence state and answers with Ack or Reject.
//! - [`AuthServer`] answers connection requests from a [`SubscriberTable`];
//!   malformed requests are logged and dropped without a reply.

use std::net::SocketAddr;

use crate::packet::{HexDump, OFF_CLIENT_ID};
use crate::responder::{respond, respond_to_connection_request};
use crate::sequencer::{KeyMode, Sequencer, DEFAULT_CONVERSATION_LENGTH, DEFAULT_MAX_CONVERSATIONS};
use crate::socket::{Socket, SocketError};
use crate::subscriber::SubscriberTable;
use crate::validator::inspect;

/// Well-known port of the segment server.
pub const SEGMENT_SERVER_PORT: u16 = 4950;

/// Well-known port of the authorization server.
pub const AUTH_SERVER_PORT: u16 = 4951;

/// Segment server tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub key_mode: KeyMode,
    /// Accepted segments after which a conversation restarts.
    pub conversation_length: u8,
    pub max_conversations: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            key_mode: KeyMode::PerConversation,
            conversation_length: DEFAULT_CONVERSATION_LENGTH,
            max_conversations: DEFAULT_MAX_CONVERSATIONS,
        }
    }
}

// ---------------------------------------------------------------------------
// SegmentServer
// ---------------------------------------------------------------------------

pub struct SegmentServer {
    socket: Socket,
    sequencer: Sequencer,
}

impl SegmentServer {
    pub async fn bind(addr: SocketAddr, config: ServerConfig) -> Result<Self, SocketError> {
        let socket = Socket::bind(addr).await?;
        Ok(Self::new(socket, config))
    }

    pub fn new(socket: Socket, config: ServerConfig) -> Self {
        Self {
            socket,
            sequencer: Sequencer::with_limits(
                config.key_mode,
                config.conversation_length,
                config.max_conversations,
            ),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Serve until the socket fails.
    pub async fn serve(mut self) -> Result<(), SocketError> {
        log::info!("[server] listening on {}", self.socket.local_addr);
        loop {
            let (datagram, src) = self.socket.recv_from().await?;
            let reply = self.handle(&datagram, src);
            self.socket.send_to(&reply, src).await?;
        }
    }

    /// Classify one datagram from `src`, update sequence state, and build the reply.
    pub fn handle(&mut self, datagram: &[u8], src: SocketAddr) -> Vec<u8> {
        log::debug!("[server] ← {src} [{}]", HexDump(datagram));

        let client_id = datagram.get(OFF_CLIENT_ID).copied().unwrap_or(0);
        let key = self.sequencer.key(src, client_id);
        let inspection = inspect(datagram, self.sequencer.last_segment_no(&key));

        match inspection.verdict {
            Ok(payload) => log::info!(
                "[server] client {} segment {} payload {:?}",
                inspection.client_id,
                inspection.segment_no,
                String::from_utf8_lossy(payload)
            ),
            Err(violation) => log::warn!(
                "[server] client {} segment {} rejected: {violation}",
                inspection.client_id,
                inspection.segment_no
            ),
        }

        let reply = respond(&inspection);
        self.sequencer.record(key, &inspection);
        log::debug!("[server] → {src} [{}]", HexDump(&reply));
        reply
    }
}

// ---------------------------------------------------------------------------
// AuthServer
// ---------------------------------------------------------------------------

pub struct AuthServer {
    socket: Socket,
    table: SubscriberTable,
}

impl AuthServer {
    pub async fn bind(addr: SocketAddr, table: SubscriberTable) -> Result<Self, SocketError> {
        let socket = Socket::bind(addr).await?;
        Ok(Self::new(socket, table))
    }

    pub fn new(socket: Socket, table: SubscriberTable) -> Self {
        Self { socket, table }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Serve until the socket fails.
    pub async fn serve(self) -> Result<(), SocketError> {
        log::info!(
            "[auth] listening on {} with {} subscriber(s)",
            self.socket.local_addr,
            self.table.len()
        );
        loop {
            let (datagram, src) = self.socket.recv_from().await?;
            if let Some(reply) = self.handle(&datagram, src) {
                self.socket.send_to(&reply, src).await?;
            }
        }
    }

    /// Answer one request, or `None` if it should be dropped.
    pub fn handle(&self, datagram: &[u8], src: SocketAddr) -> Option<Vec<u8>> {
        log::debug!("[auth] ← {src} [{}]", HexDump(datagram));
        match respond_to_connection_request(datagram, &self.table) {
            Ok((request, result, reply)) => {
                log::info!(
                    "[auth] subscriber {} tech {}: {result}",
                    request.subscriber_no,
                    request.tech
                );
                Some(reply.to_vec())
            }
            Err(e) => {
                log::warn!("[auth] dropping request from {src}: {e}");
                None
            }
        }
    }
}
