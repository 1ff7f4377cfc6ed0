//! `segment-protocol` — a small acknowledged-datagram protocol over UDP.
//!
//! Two packet families share one framing convention (`0xFF` markers around
//! every field):
//!
//! - **Segments**: a client sends numbered segments of a five-segment
//!   conversation; the server answers each with Ack or Reject(reason).
//! - **Connection requests**: a client asks whether a subscriber may connect
//!   with a given technology; the server answers from a subscriber table.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  request bytes   ┌──────────────────────────────────┐
//!  │  client  │─────────────────▶│              server              │
//!  │          │                  │  validator ─▶ responder ─▶ reply │
//!  └────┬─────┘                  │      ▲                           │
//!       │                        │  sequencer      subscriber table │
//!  ┌────▼──────┐                 └────────────────┬─────────────────┘
//!  │  session  │ stop-and-wait retry              │
//!  └────┬──────┘                                  │
//!       │ raw UDP datagrams                       │
//!  ┌────▼──────────────────────────────────────────▼┐
//!  │  socket  (thin async wrapper around tokio UdpSocket)
//!  └─────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]       — segment / ack / reject wire format
//! - [`auth_packet`]  — connection request / result wire format
//! - [`validator`]    — classifies an incoming segment
//! - [`sequencer`]    — per-conversation expected segment numbers
//! - [`responder`]    — builds replies for both families
//! - [`subscriber`]   — subscriber table loading and parsing
//! - [`server`]       — serial receive/reply loops
//! - [`session`]      — send, wait, retry
//! - [`client`]       — conversation and connection-request drivers
//! - [`simulator`]    — optional lossy relay for testing
//! - [`socket`]       — async UDP socket abstraction

pub mod auth_packet;
pub mod client;
pub mod packet;
pub mod responder;
pub mod sequencer;
pub mod server;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod subscriber;
pub mod validator;

pub use auth_packet::{AuthResult, ConnectionRequest};
pub use client::{request_connection, run_conversation, ClientError, Conversation};
pub use packet::{FaultMode, PacketError, RejectReason};
pub use server::{AuthServer, SegmentServer, ServerConfig};
pub use session::{Session, SessionConfig, SessionError};
pub use subscriber::SubscriberTable;
