//! In-memory PLC that answers MC protocol 3E and 1E binary frames.
//!
//! The frame version is detected per request: 3E requests start with the
//! `50 00` sub-header, anything else is treated as a 1E sub-header.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use melsec_mcp::frame::{pack_bits, unpack_bits};
use melsec_mcp::{DeviceCode, McpError};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub mod seed;

pub use seed::Seed;

const CMD_READ: u16 = 0x0401;
const CMD_MULTI_READ: u16 = 0x0406;
const CMD_WRITE: u16 = 0x1401;
const CMD_LOOPBACK: u16 = 0x0619;
const SUB_WORD: u16 = 0x0000;
const SUB_BIT: u16 = 0x0001;

/// 3E end code for an unsupported command.
pub const END_BAD_COMMAND: u16 = 0xC059;
/// 3E end code for an access running past the last device number.
pub const END_ADDRESS_RANGE: u16 = 0xC056;
/// 3E end code for bit access to a word device.
pub const END_BAD_DEVICE: u16 = 0xC05B;
/// 3E end code for an unregistered device code.
pub const END_BAD_REQUEST: u16 = 0xC05C;

/// Device memory keyed by 3E device code and device number.
#[derive(Debug, Default)]
pub struct DeviceStore {
    words: BTreeMap<(u8, u32), u16>,
    bits: BTreeMap<(u8, u32), bool>,
}

impl DeviceStore {
    fn read_words(&self, dev: &DeviceCode, offset: u32, count: usize) -> Vec<u16> {
        (0..count as u32)
            .map(|i| {
                if dev.is_bit() {
                    // one word covers 16 consecutive bit devices
                    let base = offset.wrapping_add(i.wrapping_mul(16));
                    (0..16).fold(0u16, |w, b| {
                        let on = self
                            .bits
                            .get(&(dev.code, base.wrapping_add(b)))
                            .copied()
                            .unwrap_or(false);
                        w | (u16::from(on) << b)
                    })
                } else {
                    self.words
                        .get(&(dev.code, offset.wrapping_add(i)))
                        .copied()
                        .unwrap_or(0)
                }
            })
            .collect()
    }

    fn write_words(&mut self, dev: &DeviceCode, offset: u32, values: &[u16]) {
        for (i, v) in (0u32..).zip(values) {
            if dev.is_bit() {
                let base = offset.wrapping_add(i.wrapping_mul(16));
                for b in 0..16 {
                    self.bits
                        .insert((dev.code, base.wrapping_add(b)), (v >> b) & 0x01 != 0);
                }
            } else {
                self.words.insert((dev.code, offset.wrapping_add(i)), *v);
            }
        }
    }

    fn read_bits(&self, dev: &DeviceCode, offset: u32, count: usize) -> Vec<bool> {
        (0..count as u32)
            .map(|i| {
                self.bits
                    .get(&(dev.code, offset.wrapping_add(i)))
                    .copied()
                    .unwrap_or(false)
            })
            .collect()
    }

    fn write_bits(&mut self, dev: &DeviceCode, offset: u32, values: &[bool]) {
        for (i, v) in (0u32..).zip(values) {
            self.bits.insert((dev.code, offset.wrapping_add(i)), *v);
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Behavior {
    forced_end_code: Option<u16>,
    close_after: Option<usize>,
}

/// Cloneable handle; clones share the same device memory.
#[derive(Clone, Default)]
pub struct MockServer {
    store: Arc<Mutex<DeviceStore>>,
    behavior: Behavior,
}

impl MockServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every device access and loopback request with `code`.
    #[must_use]
    pub const fn with_forced_end_code(mut self, code: u16) -> Self {
        self.behavior.forced_end_code = Some(code);
        self
    }

    /// Abort each connection (RST) after it has served `requests` requests.
    #[must_use]
    pub const fn with_close_after(mut self, requests: usize) -> Self {
        self.behavior.close_after = Some(requests);
        self
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut DeviceStore) -> T) -> T {
        let mut guard = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn set_words(&self, device: &str, offset: u32, values: &[u16]) -> Result<(), McpError> {
        let dev = DeviceCode::lookup(device)?;
        self.with_store(|s| s.write_words(dev, offset, values));
        Ok(())
    }

    pub fn get_words(&self, device: &str, offset: u32, count: usize) -> Result<Vec<u16>, McpError> {
        let dev = DeviceCode::lookup(device)?;
        Ok(self.with_store(|s| s.read_words(dev, offset, count)))
    }

    pub fn set_bits(&self, device: &str, offset: u32, values: &[bool]) -> Result<(), McpError> {
        let dev = DeviceCode::lookup(device)?;
        self.with_store(|s| s.write_bits(dev, offset, values));
        Ok(())
    }

    pub fn get_bits(&self, device: &str, offset: u32, count: usize) -> Result<Vec<bool>, McpError> {
        let dev = DeviceCode::lookup(device)?;
        Ok(self.with_store(|s| s.read_bits(dev, offset, count)))
    }

    /// Non-zero device memory as JSON, for dumping on exit.
    #[must_use]
    pub fn snapshot_json(&self) -> serde_json::Value {
        let name = |code: u8| DeviceCode::from_code(code).map_or("?", |d| d.symbol);
        self.with_store(|s| {
            let words: Vec<serde_json::Value> = s
                .words
                .iter()
                .filter(|(_, v)| **v != 0)
                .map(|((code, off), v)| {
                    serde_json::json!({ "device": name(*code), "offset": off, "value": v })
                })
                .collect();
            let bits: Vec<serde_json::Value> = s
                .bits
                .iter()
                .filter(|(_, v)| **v)
                .map(|((code, off), _)| serde_json::json!({ "device": name(*code), "offset": off }))
                .collect();
            serde_json::json!({ "words": words, "bits": bits })
        })
    }

    /// Bind a listener with SO_REUSEADDR so the CLI can restart on the same port.
    pub fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;
        TcpListener::from_std(socket.into())
    }

    /// Accept connections forever, one task per connection.
    pub async fn run_listener_on(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (sock, peer) = listener.accept().await?;
            tracing::debug!(%peer, "mock PLC accepted connection");
            let srv = self.clone();
            tokio::spawn(async move {
                if let Err(e) = srv.handle_connection(sock).await {
                    tracing::debug!(%peer, "connection ended: {e}");
                }
            });
        }
    }

    async fn handle_connection(&self, mut sock: TcpStream) -> std::io::Result<()> {
        let mut served = 0usize;
        loop {
            let mut first = [0u8; 1];
            if sock.read(&mut first).await? == 0 {
                return Ok(());
            }
            let reply = if first[0] == 0x50 {
                self.serve_3e(&mut sock).await?
            } else {
                match self.serve_1e(first[0], &mut sock).await? {
                    Some(r) => r,
                    None => return Ok(()),
                }
            };
            sock.write_all(&reply).await?;
            served += 1;
            if self.behavior.close_after.is_some_and(|n| served >= n) {
                // abortive close so the client sees a reset, not a clean EOF
                SockRef::from(&sock).set_linger(Some(Duration::ZERO))?;
                return Ok(());
            }
        }
    }

    async fn serve_3e(&self, sock: &mut TcpStream) -> std::io::Result<Vec<u8>> {
        // rest of sub-header + route(5) + data length(2)
        let mut head = [0u8; 8];
        sock.read_exact(&mut head).await?;
        let mut route = [0u8; 5];
        route.copy_from_slice(&head[1..6]);
        let data_len = usize::from(u16::from_le_bytes([head[6], head[7]]));
        let mut body = vec![0u8; data_len];
        sock.read_exact(&mut body).await?;
        if body.len() < 6 {
            return Ok(reply_3e(route, END_BAD_REQUEST, &error_info(route, 0, 0)));
        }
        let cmd = u16::from_le_bytes([body[2], body[3]]);
        let sub = u16::from_le_bytes([body[4], body[5]]);
        let rest = &body[6..];
        tracing::debug!("3E request cmd={cmd:04X} sub={sub:04X} {} bytes", rest.len());

        if let Some(code) = self.behavior.forced_end_code {
            return Ok(reply_3e(route, code, &error_info(route, cmd, sub)));
        }
        let result = match cmd {
            CMD_LOOPBACK => Ok(rest.to_vec()),
            CMD_MULTI_READ => self.multi_read_3e(rest),
            CMD_READ | CMD_WRITE if rest.len() >= 6 => {
                let offset = u32::from_le_bytes([rest[0], rest[1], rest[2], 0]);
                let points = usize::from(u16::from_le_bytes([rest[4], rest[5]]));
                match DeviceCode::from_code(rest[3]) {
                    Ok(dev) if cmd == CMD_READ => self.read_3e(dev, offset, points, sub),
                    Ok(dev) => self.write_3e(dev, offset, points, sub, &rest[6..]),
                    Err(_) => Err(END_BAD_REQUEST),
                }
            }
            _ => Err(END_BAD_COMMAND),
        };
        Ok(match result {
            Ok(payload) => reply_3e(route, 0, &payload),
            Err(code) => reply_3e(route, code, &error_info(route, cmd, sub)),
        })
    }

    fn read_3e(&self, dev: &DeviceCode, offset: u32, points: usize, sub: u16) -> Result<Vec<u8>, u16> {
        if last_device(dev, offset, points, sub == SUB_WORD).is_none() {
            return Err(END_ADDRESS_RANGE);
        }
        match sub {
            SUB_WORD => Ok(self
                .with_store(|s| s.read_words(dev, offset, points))
                .iter()
                .flat_map(|w| w.to_le_bytes())
                .collect()),
            SUB_BIT if dev.is_bit() => {
                let bits = self.with_store(|s| s.read_bits(dev, offset, points));
                Ok(pack_bits(&bits.iter().map(|b| u8::from(*b)).collect::<Vec<_>>()))
            }
            SUB_BIT => Err(END_BAD_DEVICE),
            _ => Err(END_BAD_COMMAND),
        }
    }

    fn write_3e(
        &self,
        dev: &DeviceCode,
        offset: u32,
        points: usize,
        sub: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, u16> {
        if last_device(dev, offset, points, sub == SUB_WORD).is_none() {
            return Err(END_ADDRESS_RANGE);
        }
        match sub {
            SUB_WORD if data.len() == 2 * points => {
                let words: Vec<u16> = data
                    .chunks_exact(2)
                    .map(|w| u16::from_le_bytes([w[0], w[1]]))
                    .collect();
                self.with_store(|s| s.write_words(dev, offset, &words));
                Ok(Vec::new())
            }
            SUB_BIT if dev.is_bit() && data.len() == points.div_ceil(2) => {
                let bits = unpack_bits(data, points);
                self.with_store(|s| s.write_bits(dev, offset, &bits));
                Ok(Vec::new())
            }
            SUB_BIT if !dev.is_bit() => Err(END_BAD_DEVICE),
            SUB_WORD | SUB_BIT => Err(0xC061),
            _ => Err(END_BAD_COMMAND),
        }
    }

    /// Word blocks followed by bit blocks, all read in word units.
    fn multi_read_3e(&self, rest: &[u8]) -> Result<Vec<u8>, u16> {
        let [word_blocks, bit_blocks, specs @ ..] = rest else {
            return Err(END_BAD_REQUEST);
        };
        let blocks = usize::from(*word_blocks) + usize::from(*bit_blocks);
        if specs.len() != blocks * 6 {
            return Err(0xC061);
        }
        let mut payload = Vec::new();
        for spec in specs.chunks_exact(6) {
            let offset = u32::from_le_bytes([spec[0], spec[1], spec[2], 0]);
            let points = usize::from(u16::from_le_bytes([spec[4], spec[5]]));
            let dev = DeviceCode::from_code(spec[3]).map_err(|_| END_BAD_REQUEST)?;
            payload.extend(self.read_3e(dev, offset, points, SUB_WORD)?);
        }
        Ok(payload)
    }

    /// Returns None when the request cannot be framed; the connection is
    /// then closed after a short error reply.
    async fn serve_1e(&self, sub_header: u8, sock: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
        let ack = sub_header | 0x80;
        // pc number + monitoring timer
        let mut head = [0u8; 3];
        sock.read_exact(&mut head).await?;
        if sub_header == 0x16 {
            let mut count = [0u8; 1];
            sock.read_exact(&mut count).await?;
            let mut data = vec![0u8; usize::from(count[0])];
            sock.read_exact(&mut data).await?;
            if let Some(code) = self.behavior.forced_end_code {
                return Ok(Some(reply_1e(ack, code, &[])));
            }
            let mut reply = vec![ack, 0x00, count[0]];
            reply.extend_from_slice(&data);
            return Ok(Some(reply));
        }
        if sub_header > 0x03 {
            tracing::debug!("1E request with unsupported sub header {sub_header:02X}");
            sock.write_all(&[ack, 0x50]).await?;
            return Ok(None);
        }

        // head device(4) + device code(2) + points(1) + 00
        let mut spec = [0u8; 8];
        sock.read_exact(&mut spec).await?;
        let offset = u32::from_le_bytes([spec[0], spec[1], spec[2], spec[3]]);
        let code_1e = u16::from_le_bytes([spec[4], spec[5]]);
        let points = if spec[6] == 0 { 256 } else { usize::from(spec[6]) };
        let data_len = match sub_header {
            0x02 => points.div_ceil(2),
            0x03 => 2 * points,
            _ => 0,
        };
        let mut data = vec![0u8; data_len];
        sock.read_exact(&mut data).await?;

        if let Some(code) = self.behavior.forced_end_code {
            return Ok(Some(reply_1e(ack, code, &[])));
        }
        let Ok(dev) = DeviceCode::from_code_1e(code_1e) else {
            return Ok(Some(reply_1e(ack, 0x5B, &[0x10])));
        };
        let sub = if sub_header & 0x01 == 0 { SUB_BIT } else { SUB_WORD };
        let result = if sub_header <= 0x01 {
            self.read_3e(dev, offset, points, sub)
        } else {
            self.write_3e(dev, offset, points, sub, &data)
        };
        Ok(Some(match result {
            Ok(payload) => reply_1e(ack, 0, &payload),
            // abnormal code 0x10: device specification error
            Err(_) => reply_1e(ack, 0x5B, &[0x10]),
        }))
    }
}

/// Last device number an access touches, or None when it is empty or runs
/// past `u32::MAX`. Word access to a bit device covers 16 devices per point.
fn last_device(dev: &DeviceCode, offset: u32, points: usize, word_units: bool) -> Option<u32> {
    let per_point = if word_units && dev.is_bit() { 16 } else { 1 };
    let span = u32::try_from(points).ok()?.checked_mul(per_point)?;
    offset.checked_add(span.checked_sub(1)?)
}

/// 3E error information: the request's route, command and sub-command.
fn error_info(route: [u8; 5], cmd: u16, sub: u16) -> Vec<u8> {
    let mut v = route.to_vec();
    v.extend_from_slice(&cmd.to_le_bytes());
    v.extend_from_slice(&sub.to_le_bytes());
    v
}

fn reply_3e(route: [u8; 5], end_code: u16, payload: &[u8]) -> Vec<u8> {
    let data_len = u16::try_from(payload.len() + 2).unwrap_or(u16::MAX);
    let mut v = vec![0xD0, 0x00];
    v.extend_from_slice(&route);
    v.extend_from_slice(&data_len.to_le_bytes());
    v.extend_from_slice(&end_code.to_le_bytes());
    v.extend_from_slice(payload);
    v
}

fn reply_1e(ack: u8, end_code: u16, payload: &[u8]) -> Vec<u8> {
    let [end, abnormal] = end_code.to_le_bytes();
    let mut v = vec![ack, end];
    if end == 0x5B {
        v.push(if payload.is_empty() { abnormal } else { payload[0] });
    } else {
        v.extend_from_slice(payload);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_and_bit_views_share_bit_devices() {
        let srv = MockServer::new();
        srv.set_bits("M", 0, &[true, false, true]).expect("set bits");
        assert_eq!(srv.get_words("M", 0, 1).expect("words"), vec![0b101]);
        srv.set_words("M", 16, &[0x8001]).expect("set words");
        let bits = srv.get_bits("M", 16, 16).expect("bits");
        assert!(bits[0] && bits[15]);
        assert!(!bits[1]);
    }

    #[test]
    fn unknown_device_rejected() {
        assert!(MockServer::new().set_words("QQ", 0, &[1]).is_err());
    }

    #[test]
    fn reply_layouts() {
        let r = reply_3e([0, 0xFF, 0xFF, 0x03, 0], 0, &[0x34, 0x12]);
        assert_eq!(r, vec![0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x04, 0x00, 0x00, 0x00, 0x34, 0x12]);
        assert_eq!(reply_1e(0x83, 0, &[]), vec![0x83, 0x00]);
        assert_eq!(reply_1e(0x81, 0x5B, &[0x10]), vec![0x81, 0x5B, 0x10]);
        assert_eq!(reply_1e(0x81, 0x1F5B, &[]), vec![0x81, 0x5B, 0x1F]);
    }

    #[test]
    fn access_past_last_device_is_rejected() {
        let srv = MockServer::new();
        let d = DeviceCode::lookup("D").expect("D");
        let m = DeviceCode::lookup("M").expect("M");
        assert_eq!(srv.read_3e(d, u32::MAX, 2, SUB_WORD), Err(END_ADDRESS_RANGE));
        assert_eq!(srv.read_3e(d, u32::MAX, 1, SUB_WORD), Ok(vec![0, 0]));
        assert_eq!(srv.read_3e(m, u32::MAX - 15, 1, SUB_WORD), Ok(vec![0, 0]));
        assert_eq!(srv.read_3e(m, u32::MAX - 14, 1, SUB_WORD), Err(END_ADDRESS_RANGE));
        assert_eq!(
            srv.write_3e(d, u32::MAX, 2, SUB_WORD, &[1, 0, 2, 0]),
            Err(END_ADDRESS_RANGE)
        );
        // direct store access wraps instead of panicking
        srv.set_words("M", u32::MAX, &[0xFFFF]).expect("set");
    }

    #[test]
    fn multi_read_returns_blocks_in_frame_order() {
        let srv = MockServer::new();
        srv.set_words("D", 100, &[1, 2]).expect("seed");
        srv.set_bits("M", 0, &[true, false, true]).expect("seed");
        // 1 word block (D100 x2), 1 bit block (M0 x1)
        let rest = [0x01, 0x01, 0x64, 0x00, 0x00, 0xA8, 0x02, 0x00, 0x00, 0x00, 0x00, 0x90, 0x01, 0x00];
        assert_eq!(srv.multi_read_3e(&rest), Ok(vec![1, 0, 2, 0, 0b101, 0]));
        assert_eq!(srv.multi_read_3e(&rest[..8]), Err(0xC061));
        assert_eq!(srv.multi_read_3e(&[0x01]), Err(END_BAD_REQUEST));
    }

    #[test]
    fn snapshot_lists_non_zero_memory() {
        let srv = MockServer::new();
        srv.set_words("D", 100, &[0, 7]).expect("set");
        srv.set_bits("Y", 2, &[true]).expect("set");
        let snap = srv.snapshot_json();
        assert_eq!(snap["words"][0]["device"], "D");
        assert_eq!(snap["words"][0]["offset"], 101);
        assert_eq!(snap["words"][0]["value"], 7);
        assert_eq!(snap["bits"][0]["device"], "Y");
        assert_eq!(snap["words"].as_array().map(Vec::len), Some(1));
    }
}
