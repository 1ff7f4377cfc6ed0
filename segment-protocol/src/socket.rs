//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that moves
//! whole datagrams as byte vectors.  Packets are validated elsewhere (the
//! server must see malformed datagrams to reject them), so this module owns
//! only byte I/O and endpoint resolution.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};

/// Receive buffer size.  Comfortably above the largest packet either
/// family can produce; anything longer is truncated by the OS and then
/// fails validation.
pub const MAX_DATAGRAM: usize = 512;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// `host:port` did not resolve to any address.
    #[error("could not resolve {0}")]
    Resolve(String),
}

/// Resolve `host` and `port` into the first matching socket address.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, SocketError> {
    let target = format!("{host}:{port}");
    let first = lookup_host(target.as_str())
        .await
        .map_err(|e| SocketError::Resolve(format!("{target}: {e}")))?
        .next();
    first.ok_or_else(|| SocketError::Resolve(target.clone()))
}

/// The wildcard address of the same family as `peer`, for binding a client.
pub fn unspecified_for(peer: SocketAddr) -> SocketAddr {
    match peer {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, datagram-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Bind an ephemeral port and connect it to `peer`, so that
    /// [`send`](Self::send) and [`recv`](Self::recv) only talk to that peer.
    pub async fn connect(peer: SocketAddr) -> Result<Self, SocketError> {
        let socket = Self::bind(unspecified_for(peer)).await?;
        socket.inner.connect(peer).await?;
        Ok(socket)
    }

    /// Address of the connected peer, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr().ok()
    }

    /// Send `bytes` as a single datagram to `dest`.
    pub async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    /// Receive the next datagram together with its sender's address.
    pub async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }

    /// Send `bytes` to the connected peer.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), SocketError> {
        self.inner.send(bytes).await?;
        Ok(())
    }

    /// Receive the next datagram from the connected peer.
    pub async fn recv(&self) -> Result<Vec<u8>, SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = self.inner.recv(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }
}
