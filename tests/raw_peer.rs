//! Sessions against hand-scripted TCP peers, for replies the mock never sends.

mod common;

use std::time::Duration;

use melsec_mcp::{Client1E, Client3E, McpError, Station1E, Station3E};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use common::{init_logging, test_config};

/// Accept one connection, read `request_len` bytes, then send each chunk
/// with a short pause in between.
async fn scripted_peer(request_len: usize, chunks: Vec<Vec<u8>>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.expect("accept");
        let mut req = vec![0u8; request_len];
        sock.read_exact(&mut req).await.expect("request");
        for chunk in chunks {
            sock.write_all(&chunk).await.expect("write chunk");
            sock.flush().await.expect("flush");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // hold the socket open until the client is done
        let mut rest = Vec::new();
        let _ = sock.read_to_end(&mut rest).await;
    });
    port
}

/// Accept one connection and answer each request in turn with its reply.
async fn scripted_exchanges(request_len: usize, replies: Vec<Vec<u8>>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.expect("accept");
        for reply in replies {
            let mut req = vec![0u8; request_len];
            if sock.read_exact(&mut req).await.is_err() {
                return;
            }
            sock.write_all(&reply).await.expect("write reply");
        }
        let mut rest = Vec::new();
        let _ = sock.read_to_end(&mut rest).await;
    });
    port
}

const HEALTH_REQUEST_3E_LEN: usize = 22;

fn health_reply_3e() -> Vec<u8> {
    let mut v = vec![0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x09, 0x00, 0x00, 0x00, 0x05, 0x00];
    v.extend_from_slice(b"ABCDE");
    v
}

#[tokio::test]
async fn fragmented_reply_is_reassembled() {
    init_logging();
    let reply = health_reply_3e();
    let chunks = vec![reply[..3].to_vec(), reply[3..10].to_vec(), reply[10..].to_vec()];
    let port = scripted_peer(HEALTH_REQUEST_3E_LEN, chunks).await;
    let mut client =
        Client3E::new("127.0.0.1", port, Station3E::local()).with_config(test_config());
    client.connect().await.expect("connect");
    client.health_check().await.expect("health check over fragments");
}

#[tokio::test]
async fn wrong_echo_fails_health_check() {
    init_logging();
    let mut reply = health_reply_3e();
    let last = reply.len() - 1;
    reply[last] = b'X';
    let port = scripted_peer(HEALTH_REQUEST_3E_LEN, vec![reply.clone()]).await;
    let mut client =
        Client3E::new("127.0.0.1", port, Station3E::local()).with_config(test_config());
    client.connect().await.expect("connect");
    match client.health_check().await {
        Err(McpError::HealthCheck { raw, .. }) => assert_eq!(raw, reply),
        other => panic!("expected HealthCheck error, got {other:?}"),
    }
}

#[tokio::test]
async fn one_e_wrong_echo_fails_health_check() {
    init_logging();
    let reply = vec![0x96, 0x00, 0x05, b'A', b'B', b'C', b'D', b'F'];
    // 16 FF 1000 05 ABCDE
    let port = scripted_peer(10, vec![reply]).await;
    let mut client =
        Client1E::new("127.0.0.1", port, Station1E::local()).with_config(test_config());
    client.connect().await.expect("connect");
    assert!(matches!(
        client.health_check().await,
        Err(McpError::HealthCheck { .. })
    ));
}

#[tokio::test]
async fn truncated_reply_times_out_and_drops_connection() {
    init_logging();
    let reply = health_reply_3e();
    let port = scripted_peer(HEALTH_REQUEST_3E_LEN, vec![reply[..12].to_vec()]).await;
    let config = test_config().with_io_timeout(Some(Duration::from_millis(200)));
    let mut client = Client3E::new("127.0.0.1", port, Station3E::local()).with_config(config);
    client.connect().await.expect("connect");
    let err = client.health_check().await.expect_err("reply never completes");
    assert!(err.is_transport(), "{err}");
    assert!(!client.is_connected());
}

#[tokio::test]
async fn zero_data_length_is_a_framing_error() {
    init_logging();
    let reply = vec![0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x00, 0x00];
    let port = scripted_peer(HEALTH_REQUEST_3E_LEN, vec![reply]).await;
    let mut client =
        Client3E::new("127.0.0.1", port, Station3E::local()).with_config(test_config());
    client.connect().await.expect("connect");
    assert!(matches!(
        client.health_check().await,
        Err(McpError::InvalidDataLength(0))
    ));
    assert!(client.is_connected());
}

#[tokio::test]
async fn rejected_body_is_discarded_before_next_exchange() {
    init_logging();
    // data length 1 cannot hold an end code; its single body byte follows
    let bad = vec![0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x01, 0x00, 0xEE];
    let port = scripted_exchanges(HEALTH_REQUEST_3E_LEN, vec![bad, health_reply_3e()]).await;
    let mut client =
        Client3E::new("127.0.0.1", port, Station3E::local()).with_config(test_config());
    client.connect().await.expect("connect");

    assert!(matches!(
        client.health_check().await,
        Err(McpError::InvalidDataLength(1))
    ));
    assert!(client.is_connected());
    client
        .health_check()
        .await
        .expect("second exchange starts on a frame boundary");
}
