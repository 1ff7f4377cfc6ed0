//! Integration tests for stop-and-wait retransmission.
//!
//! A [`Simulator`] relay sits between client and server and swallows a fixed
//! number of leading requests, which makes the attempt count deterministic.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use segment_protocol::{
    request_connection, run_conversation,
    simulator::{Simulator, SimulatorConfig},
    AuthResult, AuthServer, ClientError, Conversation, SegmentServer, ServerConfig, Session,
    SessionConfig, SessionError, SubscriberTable,
};

const ATTEMPT_TIMEOUT: Duration = Duration::from_millis(200);

fn config() -> SessionConfig {
    SessionConfig {
        attempt_timeout: ATTEMPT_TIMEOUT,
        max_attempts: 3,
    }
}

async fn spawn_segment_server() -> SocketAddr {
    let server = SegmentServer::bind("127.0.0.1:0".parse().unwrap(), ServerConfig::default())
        .await
        .unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.serve());
    addr
}

async fn lossy(upstream: SocketAddr, drop_first: usize) -> Simulator {
    let config = SimulatorConfig {
        drop_first,
        ..SimulatorConfig::default()
    };
    Simulator::spawn("127.0.0.1:0".parse().unwrap(), upstream, config)
        .await
        .expect("start relay")
}

/// Two lost copies of segment 1 are recovered on the third attempt.
#[tokio::test]
async fn reply_on_final_attempt_succeeds() {
    let relay = lossy(spawn_segment_server().await, 2).await;
    let session = Session::connect(relay.local_addr, config()).await.unwrap();

    let started = Instant::now();
    let acked = run_conversation(&session, &Conversation::new("hello"))
        .await
        .expect("conversation should survive two losses");
    assert_eq!(acked, vec![1, 2, 3, 4, 5]);
    assert!(started.elapsed() >= ATTEMPT_TIMEOUT * 2);
    assert_eq!(relay.stats().dropped, 2);
}

/// Losing every attempt surfaces a timeout after exactly `max_attempts`.
#[tokio::test]
async fn all_attempts_lost_is_a_timeout() {
    let relay = lossy(spawn_segment_server().await, 3).await;
    let session = Session::connect(relay.local_addr, config()).await.unwrap();

    let started = Instant::now();
    let err = run_conversation(&session, &Conversation::new("hello"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ClientError::Session(SessionError::Timeout { attempts: 3 })),
        "unexpected error: {err:?}"
    );
    assert!(started.elapsed() >= ATTEMPT_TIMEOUT * 3);
    assert_eq!(relay.stats().dropped, 3);
}

#[tokio::test]
async fn connection_request_is_retried() {
    let server = AuthServer::bind("127.0.0.1:0".parse().unwrap(), SubscriberTable::reference())
        .await
        .unwrap();
    let upstream = server.local_addr();
    tokio::spawn(server.serve());

    let relay = lossy(upstream, 1).await;
    let session = Session::connect(relay.local_addr, config()).await.unwrap();
    let result = request_connection(&session, 7, 4085546805, 4).await.unwrap();
    assert_eq!(result, AuthResult::Accepted);
}

#[tokio::test]
async fn silent_server_exhausts_attempts() {
    let session = Session::connect(spawn_black_hole().await, config())
        .await
        .unwrap();
    let err = request_connection(&session, 7, 4085546805, 4)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Session(SessionError::Timeout { attempts: 3 })
    ));
}

/// A bound socket that reads and discards everything.
async fn spawn_black_hole() -> SocketAddr {
    let socket = segment_protocol::socket::Socket::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = socket.local_addr;
    tokio::spawn(async move { while socket.recv_from().await.is_ok() {} });
    addr
}
