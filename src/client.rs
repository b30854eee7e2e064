use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout as tokio_timeout};

use crate::config::ClientConfig;
use crate::error::McpError;
use crate::frame::{ResponseShape, HEALTH_CHECK_DATA};
use crate::parser::Parser;
use crate::station::{Station, Station1E, Station3E};

pub type Client3E = McpClient<Station3E>;
pub type Client1E = McpClient<Station1E>;

fn hex_dump(b: &[u8]) -> String {
    b.iter()
        .map(|x| format!("{x:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T, McpError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout {
        Some(dur) => match tokio_timeout(dur, fut).await {
            Ok(r) => Ok(r?),
            Err(_) => Err(McpError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timeout",
            ))),
        },
        None => Ok(fut.await?),
    }
}

/// MC protocol session over one TCP connection.
///
/// McpClient は 1 本の TCP 接続を専有し、要求伝文の送信と応答伝文の受信を
/// 1 往復ずつ順番に行います。
///
/// Every operation is one write followed by one framed read. Methods take
/// `&mut self`, so one client can never have two requests in flight; to
/// share a client between tasks wrap it in a `tokio::sync::Mutex`.
///
/// Read and write operations return the raw response frame. Decoding it
/// (and judging its end code) is left to the caller, typically through
/// `station.parser().process(..)`.
///
/// Error handling: encoding errors are returned before anything is sent.
/// Transport errors close the connection; call [`McpClient::reconnect`]
/// to continue. Framing and protocol errors leave the connection open.
pub struct McpClient<S: Station> {
    addr: String,
    station: S,
    parser: S::Parser,
    config: ClientConfig,
    conn: Option<TcpStream>,
}

impl<S: Station> McpClient<S> {
    /// Create an unconnected client for `host:port`.
    pub fn new(host: &str, port: u16, station: S) -> Self {
        let parser = station.parser();
        Self {
            addr: format!("{host}:{port}"),
            station,
            parser,
            config: ClientConfig::global().clone(),
            conn: None,
        }
    }

    /// Create a client and connect it.
    pub async fn open(host: &str, port: u16, station: S) -> Result<Self, McpError> {
        let mut client = Self::new(host, port, station);
        client.connect().await?;
        Ok(client)
    }

    #[must_use]
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn station(&self) -> &S {
        &self.station
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub const fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Dial the PLC, bounded by the configured connect timeout. An existing
    /// connection is dropped first.
    pub async fn connect(&mut self) -> Result<(), McpError> {
        self.conn = None;
        let timeout = self.config.connect_timeout;
        let stream = match tokio_timeout(timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                tracing::warn!(addr = %self.addr, "connect error: {e}");
                return Err(McpError::Io(e));
            }
            Err(_) => {
                tracing::warn!(addr = %self.addr, "connect timeout after {timeout:?}");
                return Err(McpError::ConnectTimeout {
                    addr: self.addr.clone(),
                    timeout,
                });
            }
        };
        // requests are small and strictly request/response
        stream.set_nodelay(true)?;
        tracing::info!(
            addr = %self.addr,
            frame = %self.station.frame_version(),
            "connected to PLC"
        );
        self.conn = Some(stream);
        Ok(())
    }

    /// Close, wait the configured backoff, dial once. Callers retry on
    /// repeated failure.
    pub async fn reconnect(&mut self) -> Result<(), McpError> {
        self.shutdown().await;
        tracing::debug!(addr = %self.addr, "reconnecting in {:?}", self.config.reconnect_backoff);
        sleep(self.config.reconnect_backoff).await;
        self.connect().await
    }

    /// Close the connection. Closing a closed client does nothing.
    pub async fn shutdown(&mut self) {
        if let Some(mut stream) = self.conn.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(addr = %self.addr, "socket shutdown: {e}");
            }
            tracing::info!(addr = %self.addr, "connection closed");
        }
    }

    // 折返しテスト: "ABCDE" を送り、同じデータが返ってくることを確認する
    /// Loopback test: send "ABCDE" and require it to be echoed back exactly.
    pub async fn health_check(&mut self) -> Result<(), McpError> {
        let request = self.station.build_health_check_request()?;
        let resp = self
            .exchange(
                "health_check",
                &request,
                ResponseShape::Loopback(HEALTH_CHECK_DATA.len()),
            )
            .await?;
        if let Err(e) = self.station.verify_health_check(&resp) {
            tracing::warn!(addr = %self.addr, "health check failed: {e}");
            return Err(e);
        }
        Ok(())
    }

    /// Batch read in word units.
    pub async fn read(
        &mut self,
        device: &str,
        offset: u32,
        num_points: u16,
    ) -> Result<Vec<u8>, McpError> {
        let request = self.station.build_read_request(device, offset, num_points)?;
        self.exchange("read", &request, ResponseShape::Words(num_points))
            .await
    }

    /// Batch read in bit units. Each payload byte carries two points, so
    /// bytes come back as 00, 01, 10 or 11.
    pub async fn bit_read(
        &mut self,
        device: &str,
        offset: u32,
        num_points: u16,
    ) -> Result<Vec<u8>, McpError> {
        let request = self
            .station
            .build_bit_read_request(device, offset, num_points)?;
        self.exchange("bit_read", &request, ResponseShape::Bits(num_points))
            .await
    }

    /// Batch write in word units. Only the first `2 * num_points` bytes of
    /// `data` are sent.
    pub async fn write(
        &mut self,
        device: &str,
        offset: u32,
        num_points: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, McpError> {
        let request = self
            .station
            .build_write_request(device, offset, num_points, data)?;
        self.exchange("write", &request, ResponseShape::Ack).await
    }

    /// Batch write in bit units, one byte per point.
    pub async fn bit_write(
        &mut self,
        device: &str,
        offset: u32,
        num_points: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, McpError> {
        let request = self
            .station
            .build_bit_write_request(device, offset, num_points, data)?;
        self.exchange("bit_write", &request, ResponseShape::Ack)
            .await
    }

    fn maybe_log_payload(&self, label: &str, payload: &[u8]) {
        if self.config.log_payloads {
            log::debug!("[MC PAYLOAD {}] {}", label, hex_dump(payload));
        }
    }

    async fn exchange(
        &mut self,
        label: &str,
        request_hex: &str,
        shape: ResponseShape,
    ) -> Result<Vec<u8>, McpError> {
        let payload = hex::decode(request_hex)?;
        self.maybe_log_payload(&format!("{label} send"), &payload);
        match self.send_and_recv(&payload, shape).await {
            Ok(resp) => {
                self.maybe_log_payload(&format!("{label} recv"), &resp);
                Ok(resp)
            }
            Err(e) => {
                if e.is_transport() && self.conn.take().is_some() {
                    tracing::warn!(addr = %self.addr, "{label} failed, connection dropped: {e}");
                }
                Err(e)
            }
        }
    }

    /// Write the request, then read the header and exactly the body length
    /// the parser derives from it.
    async fn send_and_recv(
        &mut self,
        payload: &[u8],
        shape: ResponseShape,
    ) -> Result<Vec<u8>, McpError> {
        let io_timeout = self.config.io_timeout;
        let stream = self.conn.as_mut().ok_or(McpError::NotConnected)?;
        with_timeout(io_timeout, stream.write_all(payload)).await?;

        let header_len = self.parser.header_len();
        let mut buf = vec![0u8; header_len];
        with_timeout(io_timeout, stream.read_exact(&mut buf)).await?;

        let body_len = match self.parser.body_len(&buf, shape) {
            Ok(n) => n,
            Err(e) => {
                let declared = self.parser.declared_len(&buf);
                if declared > 0 {
                    let mut rest = vec![0u8; declared];
                    with_timeout(io_timeout, stream.read_exact(&mut rest)).await?;
                    tracing::debug!(
                        addr = %self.addr,
                        "discarded {declared} bytes of a rejected reply: {}",
                        hex_dump(&rest)
                    );
                }
                return Err(e);
            }
        };
        buf.resize(header_len + body_len, 0);
        if body_len > 0 {
            with_timeout(io_timeout, stream.read_exact(&mut buf[header_len..])).await?;
        }
        Ok(buf)
    }
}

impl McpClient<Station3E> {
    /// Multiple-block batch read; see [`Station3E::build_multi_read_request`]
    /// for the block order of the returned payload.
    pub async fn multi_read(&mut self, blocks: &[(&str, u32, u16)]) -> Result<Vec<u8>, McpError> {
        let request = self.station.build_multi_read_request(blocks)?;
        let points = blocks
            .iter()
            .fold(0u16, |acc, (_, _, n)| acc.saturating_add(*n));
        self.exchange("multi_read", &request, ResponseShape::Words(points))
            .await
    }
}
