//! Stop-and-wait request/response over a connected UDP socket.
//!
//! A [`Session`] delivers one request and obtains one response:
//!
//! ```text
//!  attempt 1: send ──▶ wait ≤ deadline ──▶ datagram? ──▶ return it
//!                              │ no
//!  attempt 2: send ──▶ wait ≤ deadline ──▶ ...
//!                              │ no (after max_attempts)
//!                              ▼
//!                     SessionError::Timeout
//! ```
//!
//! Retransmissions are byte-identical and there is no backoff: every attempt
//! gets the same fixed deadline.  The first datagram that arrives is
//! returned as-is; checking its content is the caller's job.  Replies to
//! earlier attempts are not deduplicated.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;

use crate::packet::HexDump;
use crate::socket::{Socket, SocketError};

/// Per-attempt deadline.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);

/// Send attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Adjustable retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long each attempt waits for a reply.
    pub attempt_timeout: Duration,
    /// Total number of sends, including the first.  Zero is treated as one.
    pub max_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// No reply arrived within any attempt's deadline.
    #[error("no response after {attempts} attempt(s)")]
    Timeout { attempts: u32 },
    #[error(transparent)]
    Socket(#[from] SocketError),
}

/// One client's connected channel to a server.
#[derive(Debug)]
pub struct Session {
    socket: Socket,
    config: SessionConfig,
}

impl Session {
    /// Open a socket connected to `peer`.
    pub async fn connect(peer: SocketAddr, config: SessionConfig) -> Result<Self, SessionError> {
        let socket = Socket::connect(peer).await?;
        log::debug!("[session] {} → {peer}", socket.local_addr);
        Ok(Self { socket, config })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Send `request` and wait for a reply, retrying on timeout.
    pub async fn exchange(&self, request: &[u8]) -> Result<Vec<u8>, SessionError> {
        exchange(&self.socket, request, &self.config).await
    }
}

/// Stop-and-wait exchange on a connected `socket`.
pub async fn exchange(
    socket: &Socket,
    request: &[u8],
    config: &SessionConfig,
) -> Result<Vec<u8>, SessionError> {
    let max_attempts = config.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        socket.send(request).await?;
        log::debug!(
            "[session] → attempt {attempt}/{max_attempts} [{}]",
            HexDump(request)
        );

        match timeout(config.attempt_timeout, recv_reply(socket)).await {
            Ok(Ok(reply)) => {
                log::debug!("[session] ← [{}]", HexDump(&reply));
                return Ok(reply);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_elapsed) => {
                log::info!(
                    "[session] no response within {:?} (attempt {attempt}/{max_attempts})",
                    config.attempt_timeout
                );
            }
        }
    }
    Err(SessionError::Timeout {
        attempts: max_attempts,
    })
}

/// Wait for the next datagram, treating an ICMP "port unreachable" report
/// as silence so the attempt runs until its deadline.
async fn recv_reply(socket: &Socket) -> Result<Vec<u8>, SocketError> {
    loop {
        match socket.recv().await {
            Err(SocketError::Io(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                log::debug!("[session] peer unreachable; still waiting");
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(max_attempts: u32) -> SessionConfig {
        SessionConfig {
            attempt_timeout: Duration::from_millis(100),
            max_attempts,
        }
    }

    #[test]
    fn default_config() {
        let c = SessionConfig::default();
        assert_eq!(c.attempt_timeout, Duration::from_secs(3));
        assert_eq!(c.max_attempts, 3);
    }

    #[tokio::test]
    async fn reply_returned_unconditionally() {
        let server = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let session = Session::connect(server.local_addr, quick(3)).await.unwrap();

        let responder = tokio::spawn(async move {
            let (req, from) = server.recv_from().await.unwrap();
            assert_eq!(req, b"request");
            server.send_to(b"not a protocol packet", from).await.unwrap();
        });

        let reply = session.exchange(b"request").await.unwrap();
        assert_eq!(reply, b"not a protocol packet");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn silent_peer_times_out_after_all_attempts() {
        let silent = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let session = Session::connect(silent.local_addr, quick(3)).await.unwrap();

        let started = tokio::time::Instant::now();
        let result = session.exchange(b"hello?").await;
        assert!(
            matches!(result, Err(SessionError::Timeout { attempts: 3 })),
            "expected Timeout, got: {result:?}"
        );
        assert!(started.elapsed() >= Duration::from_millis(300));

        // Every attempt resent the identical request.
        for _ in 0..3 {
            let (bytes, _) = silent.recv_from().await.unwrap();
            assert_eq!(bytes, b"hello?");
        }
    }

    #[tokio::test]
    async fn zero_attempts_still_sends_once() {
        let silent = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let session = Session::connect(silent.local_addr, quick(0)).await.unwrap();

        let result = session.exchange(b"once").await;
        assert!(
            matches!(result, Err(SessionError::Timeout { attempts: 1 })),
            "expected Timeout after one attempt, got: {result:?}"
        );
        let (bytes, _) = timeout(Duration::from_millis(250), silent.recv_from())
            .await
            .expect("nothing was sent")
            .unwrap();
        assert_eq!(bytes, b"once");
    }

    #[tokio::test]
    async fn closed_port_times_out_instead_of_failing() {
        let addr = {
            let tmp = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
            tmp.local_addr
        };
        let session = Session::connect(addr, quick(2)).await.unwrap();
        assert!(matches!(
            session.exchange(b"x").await,
            Err(SessionError::Timeout { attempts: 2 })
        ));
    }

    #[tokio::test]
    async fn reply_on_last_attempt_is_returned() {
        let server = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let session = Session::connect(server.local_addr, quick(3)).await.unwrap();

        let responder = tokio::spawn(async move {
            // Ignore the first two copies, answer the third.
            for _ in 0..2 {
                server.recv_from().await.unwrap();
            }
            let (_, from) = server.recv_from().await.unwrap();
            server.send_to(b"finally", from).await.unwrap();
            server
        });

        assert_eq!(session.exchange(b"req").await.unwrap(), b"finally");
        let server = responder.await.unwrap();

        // No fourth attempt follows a successful one.
        let extra = timeout(Duration::from_millis(250), server.recv_from()).await;
        assert!(extra.is_err(), "unexpected retransmission after reply");
    }
}
