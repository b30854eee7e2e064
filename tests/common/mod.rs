#![allow(dead_code)]

use std::time::Duration;

use melsec_mcp::ClientConfig;
use melsec_mcp_mock::MockServer;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Start `server` on an ephemeral port and return the port.
pub async fn spawn_mock(server: MockServer) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        let _ = server.run_listener_on(listener).await;
    });
    // give server a moment to start
    tokio::time::sleep(Duration::from_millis(20)).await;
    port
}

/// Short timeouts so a broken exchange fails fast instead of hanging the suite.
pub fn test_config() -> ClientConfig {
    ClientConfig::default()
        .with_connect_timeout(Duration::from_secs(2))
        .with_reconnect_backoff(Duration::from_millis(10))
        .with_io_timeout(Some(Duration::from_secs(2)))
        .with_log_payloads(true)
}
