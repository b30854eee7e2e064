//! Frame-format constants and helpers shared by the encoders and parsers.
//!
//! Frames are assembled as upper-case hex text, two characters per byte, and
//! only decoded to bytes right before they are written to the socket. Values
//! noted as "binary mode" are written in wire order, so e.g. command 0x0401
//! appears as "0104".

use std::fmt;
use std::str::FromStr;

use crate::error::McpError;

/// 3E request sub-header.
pub const SUB_HEADER_3E: &str = "5000";

/// Monitoring timer, 0x0010 in 250 ms units.
pub const MONITORING_TIMER: &str = "1000";

pub const HEALTH_CHECK_COMMAND: &str = "1906"; // binary mode expression. ascii mode: 0619
pub const HEALTH_CHECK_SUBCOMMAND: &str = "0000";

pub const READ_COMMAND: &str = "0104"; // ascii mode: 0401
pub const READ_SUB_COMMAND: &str = "0000";
pub const BIT_READ_SUB_COMMAND: &str = "0100";

pub const MULTI_READ_COMMAND: &str = "0604"; // ascii mode: 0406

/// Upper bound on word + bit blocks in one multiple-block read.
pub const MAX_BLOCKS_3E: usize = 120;

pub const WRITE_COMMAND: &str = "0114"; // ascii mode: 1401
pub const WRITE_SUB_COMMAND: &str = "0000";
pub const BIT_WRITE_SUB_COMMAND: &str = "0100";

/// Loopback payload: five bytes, "ABCDE".
pub const HEALTH_CHECK_DATA: &[u8; 5] = b"ABCDE";

/// 3E response header up to and including the data-length field.
pub const RESPONSE_PREFIX_3E: usize = 9;

/// Minimum buffer the 3E parser accepts.
pub const MIN_RESPONSE_LEN_3E: usize = 22;

/// Largest head device number addressable with 3-byte (Q/L series) offsets.
pub const MAX_OFFSET_3E: u32 = 0x00FF_FFFF;

// 1E sub-headers (binary mode, one byte).
pub const SUB_HEADER_1E_BIT_READ: &str = "00";
pub const SUB_HEADER_1E_WORD_READ: &str = "01";
pub const SUB_HEADER_1E_BIT_WRITE: &str = "02";
pub const SUB_HEADER_1E_WORD_WRITE: &str = "03";
pub const SUB_HEADER_1E_LOOPBACK: &str = "16";

/// 1E end code announcing a one-byte abnormal code after the header.
pub const END_CODE_1E_ABNORMAL: u8 = 0x5B;

/// 1E batch commands carry a one-byte point count where 0 means 256.
pub const MAX_POINTS_1E: u16 = 256;

/// MC protocol frame generation. Selected once per station/parser/client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameVersion {
    OneE,
    ThreeE,
}

impl FrameVersion {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneE => "1E",
            Self::ThreeE => "3E",
        }
    }
}

impl fmt::Display for FrameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1E" | "1e" => Ok(Self::OneE),
            "3E" | "3e" => Ok(Self::ThreeE),
            other => Err(format!("unknown frame version: {other}")),
        }
    }
}

/// Network / PC / unit addressing carried by 3E frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessRoute {
    pub network_number: u8,
    pub pc_number: u8,
    pub io_number: u16,
    pub station_number: u8,
}

impl AccessRoute {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0] = self.network_number;
        bytes[1] = self.pc_number;
        bytes[2..4].copy_from_slice(&self.io_number.to_le_bytes());
        bytes[4] = self.station_number;
        bytes
    }

    #[must_use]
    pub const fn with_network_number(mut self, network_number: u8) -> Self {
        self.network_number = network_number;
        self
    }
    #[must_use]
    pub const fn with_pc_number(mut self, pc_number: u8) -> Self {
        self.pc_number = pc_number;
        self
    }
    #[must_use]
    pub const fn with_io_number(mut self, io_number: u16) -> Self {
        self.io_number = io_number;
        self
    }
    #[must_use]
    pub const fn with_station_number(mut self, station_number: u8) -> Self {
        self.station_number = station_number;
        self
    }
}

/// The local station: network 00, PC FF, unit I/O 03FF, unit station 00.
impl Default for AccessRoute {
    fn default() -> Self {
        Self {
            network_number: 0x00,
            pc_number: 0xFF,
            io_number: 0x03FF,
            station_number: 0x00,
        }
    }
}

/// What the client expects back for a request. The 3E header declares its
/// own length; 1E replies are sized from the request that was sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseShape {
    Words(u16),
    Bits(u16),
    Ack,
    Loopback(usize),
}

/// Serialize `value` little-endian and keep the low `width` bytes, as hex.
#[must_use]
pub fn le_hex(value: u64, width: usize) -> String {
    let bytes = value.to_le_bytes();
    hex::encode_upper(&bytes[..width.min(bytes.len())])
}

/// Data-length field for a 3E frame: byte count of everything from the
/// monitoring timer to the end of the frame.
pub fn data_length_hex(body: &str) -> Result<String, McpError> {
    let len = body.len() / 2; // 1byte=2char
    let len = u16::try_from(len).map_err(|_| McpError::InvalidDataLength(len))?;
    Ok(le_hex(u64::from(len), 2))
}

/// Pack one byte per point (non-zero = ON) into 4-bit nibbles, high nibble
/// first, as used by bit-unit writes.
#[must_use]
pub fn pack_bits(points: &[u8]) -> Vec<u8> {
    points
        .chunks(2)
        .map(|pair| {
            let hi = u8::from(pair[0] != 0) << 4;
            let lo = pair.get(1).map_or(0, |b| u8::from(*b != 0));
            hi | lo
        })
        .collect()
}

/// Decode a nibble-packed bit-unit read payload into `points` booleans.
#[must_use]
pub fn unpack_bits(payload: &[u8], points: usize) -> Vec<bool> {
    payload
        .iter()
        .flat_map(|b| [(b >> 4) & 0x01 != 0, b & 0x01 != 0])
        .take(points)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_hex_truncates_to_width() {
        assert_eq!(le_hex(100, 3), "640000");
        assert_eq!(le_hex(0x0012_3456, 3), "563412");
        assert_eq!(le_hex(0x0102_0304, 2), "0403");
        assert_eq!(le_hex(1, 1), "01");
    }

    #[test]
    fn data_length_counts_bytes() {
        // timer + cmd + subcmd + offset + code + points = 12 bytes
        assert_eq!(data_length_hex("100001040000640000A80100").expect("len"), "0C00");
    }

    #[test]
    fn route_bytes() {
        assert_eq!(AccessRoute::default().to_bytes(), [0x00, 0xFF, 0xFF, 0x03, 0x00]);
        let r = AccessRoute::default().with_network_number(1).with_station_number(2);
        assert_eq!(r.to_bytes(), [0x01, 0xFF, 0xFF, 0x03, 0x02]);
    }

    #[test]
    fn bits_pack_and_unpack() {
        assert_eq!(pack_bits(&[1, 0, 1, 1, 0]), vec![0x10, 0x11, 0x00]);
        assert_eq!(pack_bits(&[0, 7]), vec![0x01]);
        assert_eq!(
            unpack_bits(&[0x10, 0x11, 0x00], 5),
            vec![true, false, true, true, false]
        );
    }

    #[test]
    fn frame_version_text() {
        assert_eq!("3E".parse::<FrameVersion>(), Ok(FrameVersion::ThreeE));
        assert_eq!("1e".parse::<FrameVersion>(), Ok(FrameVersion::OneE));
        assert!("4E".parse::<FrameVersion>().is_err());
        assert_eq!(FrameVersion::ThreeE.to_string(), "3E");
    }
}
