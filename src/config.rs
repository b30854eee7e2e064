use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::McpError;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;
const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 1000;

/// Session client settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    /// Pause between closing and redialing in `reconnect`.
    pub reconnect_backoff: Duration,
    /// Per send/receive bound. None leaves it to the OS.
    pub io_timeout: Option<Duration>,
    /// Hex-dump every frame at debug level.
    pub log_payloads: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect_backoff: Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MS),
            io_timeout: None,
            log_payloads: false,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    connect_timeout_ms: Option<u64>,
    reconnect_backoff_ms: Option<u64>,
    io_timeout_ms: Option<u64>,
    log_payloads: Option<bool>,
}

impl RawConfig {
    fn into_config(self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(
                self.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ),
            reconnect_backoff: Duration::from_millis(
                self.reconnect_backoff_ms
                    .unwrap_or(DEFAULT_RECONNECT_BACKOFF_MS),
            ),
            // 0 means "no timeout"
            io_timeout: self
                .io_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            log_payloads: self.log_payloads.unwrap_or(false),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl ClientConfig {
    /// Read `MCP_CONNECT_TIMEOUT_MS`, `MCP_RECONNECT_BACKOFF_MS`,
    /// `MCP_IO_TIMEOUT_MS` and `MCP_LOG_PAYLOADS=1`; unset or unparsable
    /// values take the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        RawConfig {
            connect_timeout_ms: env_u64("MCP_CONNECT_TIMEOUT_MS"),
            reconnect_backoff_ms: env_u64("MCP_RECONNECT_BACKOFF_MS"),
            io_timeout_ms: env_u64("MCP_IO_TIMEOUT_MS"),
            log_payloads: std::env::var("MCP_LOG_PAYLOADS").ok().map(|v| v == "1"),
        }
        .into_config()
    }

    /// Parse the same settings from TOML (`connect_timeout_ms = 3000`, ...).
    pub fn from_toml_str(s: &str) -> Result<Self, McpError> {
        let raw: RawConfig = toml::from_str(s)
            .map_err(|e| McpError::Config(format!("client config parse error: {e}")))?;
        Ok(raw.into_config())
    }

    pub fn from_path(path: &Path) -> Result<Self, McpError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Process-wide configuration, loaded from the environment on first use.
    pub fn global() -> &'static Self {
        &GLOBAL_CONFIG
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
    #[must_use]
    pub const fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }
    #[must_use]
    pub const fn with_log_payloads(mut self, enabled: bool) -> Self {
        self.log_payloads = enabled;
        self
    }
}

static GLOBAL_CONFIG: Lazy<ClientConfig> = Lazy::new(ClientConfig::from_env);

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_protocol_contract() {
        let c = ClientConfig::default();
        assert_eq!(c.connect_timeout, Duration::from_secs(3));
        assert_eq!(c.reconnect_backoff, Duration::from_secs(1));
        assert_eq!(c.io_timeout, None);
        assert!(!c.log_payloads);
    }

    #[test]
    fn toml_overrides_and_defaults() {
        let c = ClientConfig::from_toml_str(
            r#"
connect_timeout_ms = 500
io_timeout_ms = 2000
log_payloads = true
"#,
        )
        .expect("parse");
        assert_eq!(c.connect_timeout, Duration::from_millis(500));
        assert_eq!(c.reconnect_backoff, Duration::from_secs(1));
        assert_eq!(c.io_timeout, Some(Duration::from_secs(2)));
        assert!(c.log_payloads);

        let c = ClientConfig::from_toml_str("io_timeout_ms = 0").expect("parse");
        assert_eq!(c.io_timeout, None);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        assert!(ClientConfig::from_toml_str("connect_timeout = 1").is_err());
    }

    #[test]
    fn from_path_reads_file() {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(f, "reconnect_backoff_ms = 10").expect("write");
        let c = ClientConfig::from_path(f.path()).expect("load");
        assert_eq!(c.reconnect_backoff, Duration::from_millis(10));
    }
}
