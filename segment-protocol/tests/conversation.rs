//! Integration tests for five-segment conversations.
//!
//! Each test runs a real [`SegmentServer`] on a loopback port in a background
//! task and drives it through a client [`Session`].

use std::net::SocketAddr;
use std::time::Duration;

use segment_protocol::{
    packet::{decode_reject, encode_segment},
    run_conversation,
    sequencer::KeyMode,
    socket::Socket,
    ClientError, Conversation, FaultMode, RejectReason, SegmentServer, ServerConfig, Session,
    SessionConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn quick() -> SessionConfig {
    SessionConfig {
        attempt_timeout: Duration::from_millis(500),
        max_attempts: 3,
    }
}

/// Start a segment server on an OS-chosen loopback port.
async fn spawn_server(config: ServerConfig) -> SocketAddr {
    let server = SegmentServer::bind("127.0.0.1:0".parse().unwrap(), config)
        .await
        .expect("bind segment server");
    let addr = server.local_addr();
    tokio::spawn(server.serve());
    addr
}

/// Returns (sent segment, segment the server echoed, reason).
async fn rejection_for(fault: FaultMode, fault_at: u8) -> (u8, u8, RejectReason) {
    let addr = spawn_server(ServerConfig::default()).await;
    let session = Session::connect(addr, quick()).await.unwrap();
    let conversation = Conversation::new("hello").with_fault(fault, fault_at);
    match run_conversation(&session, &conversation).await {
        Err(ClientError::Rejected {
            segment_no,
            echoed_segment_no,
            reason,
        }) => (segment_no, echoed_segment_no, reason),
        other => panic!("expected a rejection, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_conversation_is_fully_acknowledged() {
    let addr = spawn_server(ServerConfig::default()).await;
    let session = Session::connect(addr, quick()).await.unwrap();

    let acked = run_conversation(&session, &Conversation::new("hello"))
        .await
        .expect("conversation failed");
    assert_eq!(acked, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn conversations_repeat_on_the_same_session() {
    let addr = spawn_server(ServerConfig::default()).await;
    let session = Session::connect(addr, quick()).await.unwrap();

    for _ in 0..3 {
        let acked = run_conversation(&session, &Conversation::new("again"))
            .await
            .unwrap();
        assert_eq!(acked.len(), 5);
    }
}

/// Segments 1 and 2 are acknowledged, segment 3 goes out numbered 4, the
/// server rejects it as out of sequence, and the next conversation starts
/// over from segment 1.
#[tokio::test]
async fn bad_sequence_rejects_and_resets() {
    let addr = spawn_server(ServerConfig::default()).await;
    let session = Session::connect(addr, quick()).await.unwrap();

    let conversation = Conversation::new("hello").with_fault(FaultMode::BadSequence, 3);
    let err = run_conversation(&session, &conversation).await.unwrap_err();
    assert!(
        matches!(
            err,
            ClientError::Rejected {
                segment_no: 3,
                echoed_segment_no: 4,
                reason: RejectReason::OutOfSequence
            }
        ),
        "unexpected error: {err:?}"
    );

    let acked = run_conversation(&session, &Conversation::new("hello"))
        .await
        .expect("state was not reset after the rejection");
    assert_eq!(acked, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn bad_length_is_a_length_mismatch() {
    assert_eq!(
        rejection_for(FaultMode::BadLength, 3).await,
        (3, 3, RejectReason::LengthMismatch)
    );
}

#[tokio::test]
async fn missing_terminator_is_reported() {
    assert_eq!(
        rejection_for(FaultMode::MissingTerminator, 2).await,
        (2, 2, RejectReason::MissingTerminator)
    );
}

#[tokio::test]
async fn repeated_segment_is_a_duplicate() {
    assert_eq!(
        rejection_for(FaultMode::Duplicate, 3).await,
        (3, 2, RejectReason::Duplicate)
    );
}

#[tokio::test]
async fn bad_sequence_on_first_segment() {
    assert_eq!(
        rejection_for(FaultMode::BadSequence, 1).await,
        (1, 2, RejectReason::OutOfSequence)
    );
}

/// Segment 1 has no predecessor to repeat, so the duplicate fault is a no-op.
#[tokio::test]
async fn duplicate_fault_on_first_segment_is_ignored() {
    let addr = spawn_server(ServerConfig::default()).await;
    let session = Session::connect(addr, quick()).await.unwrap();
    let conversation = Conversation::new("hello").with_fault(FaultMode::Duplicate, 1);
    assert_eq!(run_conversation(&session, &conversation).await.unwrap().len(), 5);
}

/// Two clients interleaving segments keep separate sequences by default.
#[tokio::test]
async fn interleaved_clients_do_not_interfere() {
    let addr = spawn_server(ServerConfig::default()).await;
    let a = Session::connect(addr, quick()).await.unwrap();
    let b = Session::connect(addr, quick()).await.unwrap();

    let first = Conversation::new("from a");
    let second = Conversation::new("from b").with_client_id(8);
    let (ra, rb) = tokio::join!(
        run_conversation(&a, &first),
        run_conversation(&b, &second),
    );
    assert_eq!(ra.unwrap().len(), 5);
    assert_eq!(rb.unwrap().len(), 5);
}

/// With one shared sequence a second client starting at segment 1 collides
/// with the first client's progress.
#[tokio::test]
async fn shared_sequence_collides_across_clients() {
    let config = ServerConfig {
        key_mode: KeyMode::Shared,
        ..ServerConfig::default()
    };
    let addr = spawn_server(config).await;

    let a = Socket::connect(addr).await.unwrap();
    let b = Socket::connect(addr).await.unwrap();

    a.send(&encode_segment(b"a", 7, 1, FaultMode::None).unwrap())
        .await
        .unwrap();
    a.recv().await.unwrap();

    b.send(&encode_segment(b"b", 8, 1, FaultMode::None).unwrap())
        .await
        .unwrap();
    let rejection = decode_reject(&b.recv().await.unwrap()).unwrap();
    assert_eq!(rejection.reason, RejectReason::Duplicate);
    assert_eq!(rejection.client_id, 8);
}

/// Garbage datagrams get an Unknown reject and never stop the server.
#[tokio::test]
async fn server_survives_garbage() {
    let addr = spawn_server(ServerConfig::default()).await;
    let raw = Socket::connect(addr).await.unwrap();

    let junk: [&[u8]; 3] = [b"", b"\x01\x02\x03", b"\xff\xff\x07\xff\xf2\x01\xff\xff"];
    for junk in junk {
        raw.send(junk).await.unwrap();
        let rejection = decode_reject(&raw.recv().await.unwrap()).unwrap();
        assert_eq!(rejection.reason, RejectReason::Unknown);
    }

    let session = Session::connect(addr, quick()).await.unwrap();
    assert!(run_conversation(&session, &Conversation::new("still up"))
        .await
        .is_ok());
}

#[tokio::test]
async fn oversized_payload_fails_before_sending() {
    let addr = spawn_server(ServerConfig::default()).await;
    let session = Session::connect(addr, quick()).await.unwrap();
    let err = run_conversation(&session, &Conversation::new(vec![b'x'; 256]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Packet(_)), "unexpected error: {err:?}");
}
