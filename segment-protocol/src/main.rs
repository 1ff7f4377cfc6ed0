//! Entry point for `segment-protocol`.
//!
//! Parses CLI arguments and dispatches into one of four modes: the segment
//! server and client, and the authorization server and client.  All protocol
//! work is delegated to library modules; `main.rs` owns only process setup
//! (logging, argument parsing) and operator-facing output.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use segment_protocol::client::{send_connection_request, DEFAULT_CLIENT_ID, DEFAULT_FAULT_SEGMENT};
use segment_protocol::sequencer::KeyMode;
use segment_protocol::server::{AUTH_SERVER_PORT, SEGMENT_SERVER_PORT};
use segment_protocol::session::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MAX_ATTEMPTS};
use segment_protocol::socket::resolve;
use segment_protocol::{
    run_conversation, AuthServer, ConnectionRequest, Conversation, FaultMode, SegmentServer,
    ServerConfig, Session, SessionConfig, SubscriberTable,
};

/// Acknowledged segment exchange and subscriber authorization over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the segment server.
    Server {
        /// Local address to bind.
        #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], SEGMENT_SERVER_PORT)))]
        bind: SocketAddr,
        /// Track one sequence for all clients instead of one per conversation.
        #[arg(long)]
        shared_sequence: bool,
    },
    /// Send a five-segment conversation to a segment server.
    Client {
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(short, long, default_value_t = SEGMENT_SERVER_PORT)]
        port: u16,
        /// Payload carried by every segment.
        #[arg(short, long)]
        message: String,
        /// Fault to inject: n(one), s(equence), l(ength), e(nd marker), d(uplicate).
        #[arg(short, long, default_value = "n")]
        fault: FaultMode,
        /// Segment number that receives the fault.
        #[arg(long, default_value_t = DEFAULT_FAULT_SEGMENT)]
        fault_at: u8,
        #[arg(long, default_value_t = DEFAULT_CLIENT_ID)]
        client_id: u8,
        #[command(flatten)]
        retry: RetryArgs,
    },
    /// Run the authorization server.
    AuthServer {
        #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], AUTH_SERVER_PORT)))]
        bind: SocketAddr,
        /// Subscriber file, or `test` for the built-in reference table.
        #[arg(long)]
        db: String,
    },
    /// Ask an authorization server whether a subscriber may connect.
    AuthClient {
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(short, long, default_value_t = AUTH_SERVER_PORT)]
        port: u16,
        /// Subscriber number (at most 4294967295).
        #[arg(short, long)]
        subscriber_no: u64,
        /// Access technology generation, 2 through 5.
        #[arg(short, long)]
        tech: u8,
        #[arg(long, default_value_t = DEFAULT_CLIENT_ID)]
        client_id: u8,
        #[command(flatten)]
        retry: RetryArgs,
    },
}

#[derive(clap::Args)]
struct RetryArgs {
    /// Send attempts before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    attempts: u32,
    /// Per-attempt reply deadline in milliseconds.
    #[arg(long, default_value_t = DEFAULT_ATTEMPT_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,
}

impl RetryArgs {
    fn config(&self) -> SessionConfig {
        SessionConfig {
            attempt_timeout: Duration::from_millis(self.timeout_ms),
            max_attempts: self.attempts,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server {
            bind,
            shared_sequence,
        } => {
            let config = ServerConfig {
                key_mode: if shared_sequence {
                    KeyMode::Shared
                } else {
                    KeyMode::PerConversation
                },
                ..ServerConfig::default()
            };
            let server = SegmentServer::bind(bind, config)
                .await
                .with_context(|| format!("binding segment server to {bind}"))?;
            server.serve().await?;
        }
        Mode::Client {
            host,
            port,
            message,
            fault,
            fault_at,
            client_id,
            retry,
        } => {
            let peer = resolve(&host, port).await?;
            let session = Session::connect(peer, retry.config()).await?;
            let conversation = Conversation::new(message)
                .with_fault(fault, fault_at)
                .with_client_id(client_id);
            let acked = run_conversation(&session, &conversation).await?;
            println!("All {} segments acknowledged.", acked.len());
        }
        Mode::AuthServer { bind, db } => {
            // Load before binding so a bad file never opens a socket.
            let table = SubscriberTable::from_source(&db)?;
            let server = AuthServer::bind(bind, table)
                .await
                .with_context(|| format!("binding authorization server to {bind}"))?;
            server.serve().await?;
        }
        Mode::AuthClient {
            host,
            port,
            subscriber_no,
            tech,
            client_id,
            retry,
        } => {
            // Range checks happen before any socket is opened.
            let request = ConnectionRequest::new(client_id, subscriber_no, tech)?;
            let peer = resolve(&host, port).await?;
            let session = Session::connect(peer, retry.config()).await?;
            let result = send_connection_request(&session, &request).await?;
            println!("Subscriber {subscriber_no}: {result}");
        }
    }
    Ok(())
}
