use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    // encoding
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("invalid station field {field}: {value:?}")]
    InvalidStationField { field: &'static str, value: String },

    #[error("device offset {offset} out of range (max {max})")]
    OffsetOutOfRange { offset: u32, max: u32 },

    #[error("point count {points} out of range (1..={max})")]
    InvalidPointCount { points: u16, max: u16 },

    #[error("block count {blocks} out of range (1..={max})")]
    InvalidBlockCount { blocks: usize, max: usize },

    #[error("write data too short: need {expected} bytes, got {actual}")]
    WriteDataTooShort { expected: usize, actual: usize },

    #[error("config error: {0}")]
    Config(String),

    // transport
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("client is not connected")]
    NotConnected,

    // framing
    #[error("response too short: need at least {expected} bytes, got {actual}")]
    ResponseTooShort { expected: usize, actual: usize },

    #[error("invalid response data length: {0}")]
    InvalidDataLength(usize),

    #[error("malformed hex frame: {0}")]
    Hex(#[from] hex::FromHexError),

    // protocol
    #[error("PLC returned an error code: {}", hex::encode_upper(.code))]
    PlcError { code: Vec<u8> },

    #[error("device end code: 0x{code:04X}{}", crate::end_code::describe_suffix(.code))]
    EndCode { code: u16, raw: Vec<u8> },

    #[error("health check failed: {reason} [{}]", hex::encode_upper(.raw))]
    HealthCheck { reason: &'static str, raw: Vec<u8> },
}

impl McpError {
    /// Transport failures leave the socket in an unknown state; the client
    /// drops its connection when one of these is returned.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ConnectTimeout { .. } | Self::NotConnected
        )
    }

    /// Raw bytes received from the PLC, for protocol-level failures.
    #[must_use]
    pub fn raw_response(&self) -> Option<&[u8]> {
        match self {
            Self::PlcError { code } => Some(code),
            Self::EndCode { raw, .. } | Self::HealthCheck { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
