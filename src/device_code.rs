use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::McpError;

/// Whether a device class is addressed in bit or word units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Bit,
    Word,
}

/// One entry of the device table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCode {
    pub symbol: &'static str,
    /// One-byte code used by 3E frames.
    pub code: u8,
    /// Two-byte code used by 1E frames.
    pub code_1e: u16,
    pub kind: DeviceKind,
    pub description: &'static str,
}

#[derive(Deserialize)]
struct RawFile {
    #[serde(rename = "device")]
    devices: Vec<RawDevice>,
}

#[derive(Deserialize)]
struct RawDevice {
    symbol: String,
    code: u8,
    code_1e: u16,
    kind: DeviceKind,
    #[serde(default)]
    description: String,
}

static CODE_BY_NAME: Lazy<HashMap<&'static str, DeviceCode>> = Lazy::new(|| {
    let s = include_str!("./devices.toml");
    // build.rs already validated the embedded table, so a failure here means
    // the binary itself is corrupt. Log and continue with an empty table:
    // every lookup then fails with UnknownDevice instead of panicking.
    let rf: RawFile = match toml::from_str(s) {
        Ok(rf) => rf,
        Err(e) => {
            tracing::warn!("failed to parse embedded devices.toml: {}", e);
            return HashMap::new();
        }
    };
    let mut m = HashMap::with_capacity(rf.devices.len());
    for d in rf.devices {
        let symbol: &'static str = Box::leak(d.symbol.into_boxed_str());
        let description: &'static str = Box::leak(d.description.into_boxed_str());
        m.insert(
            symbol,
            DeviceCode {
                symbol,
                code: d.code,
                code_1e: d.code_1e,
                kind: d.kind,
                description,
            },
        );
    }
    m
});

static NAME_BY_CODE: Lazy<HashMap<u8, &'static str>> = Lazy::new(|| {
    CODE_BY_NAME
        .values()
        .map(|d| (d.code, d.symbol))
        .collect()
});

impl DeviceCode {
    /// Look up a device class by its symbol ("D", "M", ...).
    pub fn lookup(name: &str) -> Result<&'static Self, McpError> {
        CODE_BY_NAME
            .get(name)
            .ok_or_else(|| McpError::UnknownDevice(name.to_string()))
    }

    /// Reverse lookup by 3E device code.
    pub fn from_code(code: u8) -> Result<&'static Self, McpError> {
        NAME_BY_CODE
            .get(&code)
            .and_then(|name| CODE_BY_NAME.get(name))
            .ok_or_else(|| McpError::UnknownDevice(format!("0x{code:02X}")))
    }

    /// Reverse lookup by 1E device code.
    pub fn from_code_1e(code: u16) -> Result<&'static Self, McpError> {
        CODE_BY_NAME
            .values()
            .find(|d| d.code_1e == code)
            .ok_or_else(|| McpError::UnknownDevice(format!("0x{code:04X}")))
    }

    /// 3E code as the two hex characters placed in a frame.
    #[must_use]
    pub fn hex(&self) -> String {
        format!("{:02X}", self.code)
    }

    #[must_use]
    pub const fn is_bit(&self) -> bool {
        matches!(self.kind, DeviceKind::Bit)
    }

    /// All registered symbols, sorted.
    #[must_use]
    pub fn symbols() -> Vec<&'static str> {
        let mut v: Vec<&'static str> = CODE_BY_NAME.keys().copied().collect();
        v.sort_unstable();
        v
    }
}
