//! Lossy UDP relay for exercising the retry discipline.
//!
//! Real networks drop packets.  To test stop-and-wait retransmission without
//! depending on actual network conditions, a [`Simulator`] sits between a
//! client and a server and forwards datagrams in both directions, applying a
//! configurable fault model:
//!
//! | Fault          | Description                                          |
//! |----------------|------------------------------------------------------|
//! | Leading loss   | Drop the first `drop_first` client → server packets. |
//! | Random loss    | Drop any packet with probability `loss_rate`.        |
//!
//! Random loss uses a seeded RNG so failures are reproducible.  Replies are
//! routed back to whichever client address sent the most recent datagram.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;

use crate::socket::{Socket, SocketError};

/// Configuration for the fault-injection model.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability in `[0.0, 1.0]` that any given packet is silently dropped.
    pub loss_rate: f64,
    /// Number of initial client → server packets to drop unconditionally.
    pub drop_first: usize,
    /// RNG seed for `loss_rate`.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default; the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            drop_first: 0,
            seed: 0,
        }
    }
}

/// Counters kept by the relay task.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimulatorStats {
    pub forwarded: u64,
    pub dropped: u64,
}

/// A running relay.  Dropping it stops the relay task.
pub struct Simulator {
    /// Address clients should send to instead of the real server.
    pub local_addr: SocketAddr,
    stats: Arc<Mutex<SimulatorStats>>,
    handle: JoinHandle<()>,
}

impl Simulator {
    /// Start relaying from `listen` to `upstream`.
    pub async fn spawn(
        listen: SocketAddr,
        upstream: SocketAddr,
        config: SimulatorConfig,
    ) -> Result<Self, SocketError> {
        let front = Socket::bind(listen).await?;
        let back = Socket::connect(upstream).await?;
        let local_addr = front.local_addr;
        let stats = Arc::new(Mutex::new(SimulatorStats::default()));
        let handle = tokio::spawn(relay(front, back, config, Arc::clone(&stats)));
        log::debug!("[relay] {local_addr} ⇄ {upstream}");
        Ok(Self {
            local_addr,
            stats,
            handle,
        })
    }

    pub fn stats(&self) -> SimulatorStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn relay(
    front: Socket,
    back: Socket,
    config: SimulatorConfig,
    stats: Arc<Mutex<SimulatorStats>>,
) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let loss_rate = config.loss_rate.clamp(0.0, 1.0);
    let mut leading_drops = config.drop_first;
    let mut client: Option<SocketAddr> = None;

    let count = |dropped: bool| {
        if let Ok(mut s) = stats.lock() {
            if dropped {
                s.dropped += 1;
            } else {
                s.forwarded += 1;
            }
        }
    };

    loop {
        tokio::select! {
            // ── client → server ─────────────────────────────────────────
            result = front.recv_from() => {
                let (bytes, from) = match result {
                    Ok(v) => v,
                    Err(e) => {
                        log::debug!("[relay] front socket failed: {e}");
                        break;
                    }
                };
                client = Some(from);
                if leading_drops > 0 {
                    leading_drops -= 1;
                    log::debug!("[relay] dropped request from {from} (leading loss)");
                    count(true);
                    continue;
                }
                if rng.gen_bool(loss_rate) {
                    log::debug!("[relay] dropped request from {from}");
                    count(true);
                    continue;
                }
                if back.send(&bytes).await.is_err() {
                    break;
                }
                count(false);
            }

            // ── server → client ─────────────────────────────────────────
            result = back.recv() => {
                let bytes = match result {
                    Ok(v) => v,
                    Err(SocketError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => continue,
                    Err(e) => {
                        log::debug!("[relay] back socket failed: {e}");
                        break;
                    }
                };
                let Some(dest) = client else { continue };
                if rng.gen_bool(loss_rate) {
                    log::debug!("[relay] dropped reply to {dest}");
                    count(true);
                    continue;
                }
                if front.send_to(&bytes, dest).await.is_err() {
                    break;
                }
                count(false);
            }
        }
    }
}
