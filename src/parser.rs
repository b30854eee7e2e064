//! Response decoding.
//!
//! A [`Parser`] splits a received buffer into the fixed-offset header fields
//! of its frame version and also tells the client how many bytes make up a
//! complete response, so the socket can be read until the frame is whole.
//! Parsing never judges the end code; see [`Response::check_end_code`].

use crate::error::McpError;
use crate::frame::{
    unpack_bits, FrameVersion, ResponseShape, END_CODE_1E_ABNORMAL, MIN_RESPONSE_LEN_3E,
    RESPONSE_PREFIX_3E,
};

/// Decoded MC response. Header fields are upper-case hex text of the bytes
/// as received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub sub_header: String,
    /// 3E only.
    pub network_num: Option<String>,
    /// 3E only.
    pub pc_num: Option<String>,
    /// 3E only.
    pub unit_io_num: Option<String>,
    /// 3E only.
    pub unit_station_num: Option<String>,
    /// 3E only.
    pub data_len: Option<String>,
    pub end_code: String,
    pub payload: Vec<u8>,
}

impl Response {
    /// End code as a number. 3E end codes are little-endian on the wire.
    pub fn end_code_value(&self) -> Result<u16, McpError> {
        let bytes = hex::decode(&self.end_code)?;
        Ok(match bytes.as_slice() {
            [b] => u16::from(*b),
            [lo, hi] => u16::from_le_bytes([*lo, *hi]),
            _ => return Err(McpError::InvalidDataLength(bytes.len())),
        })
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.end_code.bytes().all(|c| c == b'0')
    }

    /// Turn a non-zero end code into `McpError::EndCode`, keeping the payload
    /// (the PLC's error information) for diagnosis.
    pub fn check_end_code(self) -> Result<Self, McpError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(McpError::EndCode {
            code: self.end_code_value()?,
            raw: self.payload,
        })
    }

    /// Payload as little-endian words; a trailing odd byte is ignored.
    #[must_use]
    pub fn words(&self) -> Vec<u16> {
        self.payload
            .chunks_exact(2)
            .map(|w| u16::from_le_bytes([w[0], w[1]]))
            .collect()
    }

    /// Payload of a bit-unit read as one flag per point.
    #[must_use]
    pub fn bits(&self, points: usize) -> Vec<bool> {
        unpack_bits(&self.payload, points)
    }
}

pub trait Parser: Send + Sync {
    fn frame_version(&self) -> FrameVersion;

    fn process(&self, resp: &[u8]) -> Result<Response, McpError>;

    /// Bytes to read before the remaining length is known.
    fn header_len(&self) -> usize;

    /// Bytes still to read after `header`, for a reply to a request of `shape`.
    fn body_len(&self, header: &[u8], shape: ResponseShape) -> Result<usize, McpError>;

    /// Bytes the peer announced after `header`, whether or not `body_len`
    /// accepts them. The client discards these on a framing error so the
    /// next reply starts on a frame boundary.
    fn declared_len(&self, _header: &[u8]) -> usize {
        0
    }
}

/// Parser chosen by frame version at runtime.
#[must_use]
pub fn new_parser(frame_version: FrameVersion) -> Box<dyn Parser> {
    match frame_version {
        FrameVersion::OneE => Box::new(Parser1E),
        FrameVersion::ThreeE => Box::new(Parser3E),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Parser3E;

impl Parser for Parser3E {
    fn frame_version(&self) -> FrameVersion {
        FrameVersion::ThreeE
    }

    fn process(&self, resp: &[u8]) -> Result<Response, McpError> {
        if resp.len() < MIN_RESPONSE_LEN_3E {
            return Err(McpError::ResponseTooShort {
                expected: MIN_RESPONSE_LEN_3E,
                actual: resp.len(),
            });
        }
        // data length covers end code + payload; trailing bytes past it are
        // not part of this reply
        let data_len = usize::from(u16::from_le_bytes([resp[7], resp[8]]));
        let payload_end = (9 + data_len).clamp(11, resp.len());
        Ok(Response {
            sub_header: hex::encode_upper(&resp[0..2]),
            network_num: Some(hex::encode_upper(&resp[2..3])),
            pc_num: Some(hex::encode_upper(&resp[3..4])),
            unit_io_num: Some(hex::encode_upper(&resp[4..6])),
            unit_station_num: Some(hex::encode_upper(&resp[6..7])),
            data_len: Some(hex::encode_upper(&resp[7..9])),
            end_code: hex::encode_upper(&resp[9..11]),
            payload: resp[11..payload_end].to_vec(),
        })
    }

    fn header_len(&self) -> usize {
        RESPONSE_PREFIX_3E
    }

    fn body_len(&self, header: &[u8], _shape: ResponseShape) -> Result<usize, McpError> {
        if header.len() < RESPONSE_PREFIX_3E {
            return Err(McpError::ResponseTooShort {
                expected: RESPONSE_PREFIX_3E,
                actual: header.len(),
            });
        }
        // data length covers end code + payload
        let data_len = usize::from(u16::from_le_bytes([header[7], header[8]]));
        if data_len < 2 {
            return Err(McpError::InvalidDataLength(data_len));
        }
        Ok(data_len)
    }

    fn declared_len(&self, header: &[u8]) -> usize {
        header
            .get(7..9)
            .map_or(0, |b| usize::from(u16::from_le_bytes([b[0], b[1]])))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Parser1E;

impl Parser for Parser1E {
    fn frame_version(&self) -> FrameVersion {
        FrameVersion::OneE
    }

    fn process(&self, resp: &[u8]) -> Result<Response, McpError> {
        if resp.len() < 2 {
            return Err(McpError::ResponseTooShort {
                expected: 2,
                actual: resp.len(),
            });
        }
        if resp.len() == 2 {
            return Err(McpError::PlcError {
                code: resp[0..2].to_vec(),
            });
        }
        Ok(Response {
            sub_header: hex::encode_upper(&resp[0..1]),
            network_num: None,
            pc_num: None,
            unit_io_num: None,
            unit_station_num: None,
            data_len: None,
            end_code: hex::encode_upper(&resp[1..2]),
            payload: resp[2..].to_vec(),
        })
    }

    fn header_len(&self) -> usize {
        2
    }

    fn body_len(&self, header: &[u8], shape: ResponseShape) -> Result<usize, McpError> {
        if header.len() < 2 {
            return Err(McpError::ResponseTooShort {
                expected: 2,
                actual: header.len(),
            });
        }
        Ok(match header[1] {
            0x00 => match shape {
                ResponseShape::Words(n) => 2 * usize::from(n),
                ResponseShape::Bits(n) => usize::from(n).div_ceil(2),
                ResponseShape::Ack => 0,
                // echoed byte count + data
                ResponseShape::Loopback(n) => 1 + n,
            },
            END_CODE_1E_ABNORMAL => 1,
            _ => 0,
        })
    }
}
