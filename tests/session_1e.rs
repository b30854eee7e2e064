mod common;

use melsec_mcp::{Client1E, McpError, Parser, Station, Station1E};
use melsec_mcp_mock::MockServer;

use common::{init_logging, spawn_mock, test_config};

async fn connect(port: u16) -> Client1E {
    let mut client =
        Client1E::new("127.0.0.1", port, Station1E::local()).with_config(test_config());
    client.connect().await.expect("connect to mock");
    client
}

#[tokio::test]
async fn loopback_health_check() {
    init_logging();
    let port = spawn_mock(MockServer::new()).await;
    let mut client = connect(port).await;
    client.health_check().await.expect("health check");
}

#[tokio::test]
async fn word_read_and_parse() {
    init_logging();
    let server = MockServer::new();
    server.set_words("D", 100, &[0x1234, 0x0001]).expect("seed");
    let port = spawn_mock(server).await;
    let mut client = connect(port).await;

    let raw = client.read("D", 100, 2).await.expect("read");
    assert_eq!(raw, vec![0x81, 0x00, 0x34, 0x12, 0x01, 0x00]);
    let resp = client
        .station()
        .parser()
        .process(&raw)
        .expect("parse")
        .check_end_code()
        .expect("end code");
    assert_eq!(resp.sub_header, "81");
    assert_eq!(resp.words(), vec![0x1234, 0x0001]);
}

#[tokio::test]
async fn write_ack_is_two_bytes() {
    init_logging();
    let server = MockServer::new();
    let port = spawn_mock(server.clone()).await;
    let mut client = connect(port).await;

    let ack = client.write("D", 5, 1, &[0xCD, 0xAB]).await.expect("write");
    assert_eq!(ack, vec![0x83, 0x00]);
    assert_eq!(server.get_words("D", 5, 1).expect("get"), vec![0xABCD]);
    // a bare two byte reply is reported as a PLC error by the parser
    assert!(matches!(
        client.station().parser().process(&ack),
        Err(McpError::PlcError { .. })
    ));
}

#[tokio::test]
async fn bit_write_and_read_full_256_points() {
    init_logging();
    let server = MockServer::new();
    let port = spawn_mock(server.clone()).await;
    let mut client = connect(port).await;

    let data: Vec<u8> = (0..256).map(|i| u8::from(i % 3 == 0)).collect();
    let ack = client.bit_write("M", 0, 256, &data).await.expect("bit write");
    assert_eq!(ack, vec![0x82, 0x00]);

    let raw = client.bit_read("M", 0, 256).await.expect("bit read");
    assert_eq!(raw.len(), 2 + 128);
    let bits = client.station().parser().process(&raw).expect("parse").bits(256);
    let expected: Vec<bool> = data.iter().map(|b| *b != 0).collect();
    assert_eq!(bits, expected);
}

#[tokio::test]
async fn abnormal_end_code_carries_detail_byte() {
    init_logging();
    let port = spawn_mock(MockServer::new()).await;
    let mut client = connect(port).await;

    let raw = client.bit_read("D", 0, 4).await.expect("exchange succeeds");
    assert_eq!(raw, vec![0x80, 0x5B, 0x10]);
    let resp = client.station().parser().process(&raw).expect("parse");
    match resp.check_end_code() {
        Err(McpError::EndCode { code, raw }) => {
            assert_eq!(code, 0x5B);
            assert_eq!(raw, vec![0x10]);
        }
        other => panic!("expected EndCode, got {other:?}"),
    }
}

#[tokio::test]
async fn points_above_256_rejected_before_send() {
    let mut client = Client1E::new("127.0.0.1", 1, Station1E::local());
    assert!(matches!(
        client.read("D", 0, 257).await,
        Err(McpError::InvalidPointCount { points: 257, max: 256 })
    ));
}

#[tokio::test]
async fn read_past_last_device_number_is_abnormal() {
    init_logging();
    let port = spawn_mock(MockServer::new()).await;
    let mut client = connect(port).await;

    let raw = client.read("D", u32::MAX, 2).await.expect("exchange succeeds");
    assert_eq!(raw, vec![0x81, 0x5B, 0x10]);
    // the mock keeps serving after the rejected request
    client.health_check().await.expect("still served");
}
