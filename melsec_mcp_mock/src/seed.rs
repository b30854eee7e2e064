//! Initial device memory loaded from TOML.
//!
//! ```toml
//! [[words]]
//! device = "D"
//! offset = 100
//! values = [0x1234, 1, 2]
//!
//! [[bits]]
//! device = "M"
//! offset = 0
//! values = [true, false, true]
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::MockServer;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Seed {
    #[serde(default)]
    pub words: Vec<WordSeed>,
    #[serde(default)]
    pub bits: Vec<BitSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WordSeed {
    pub device: String,
    pub offset: u32,
    pub values: Vec<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BitSeed {
    pub device: String,
    pub offset: u32,
    pub values: Vec<bool>,
}

impl Seed {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("invalid seed file")
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&s)
    }

    pub fn apply(&self, server: &MockServer) -> anyhow::Result<()> {
        for w in &self.words {
            server
                .set_words(&w.device, w.offset, &w.values)
                .with_context(|| format!("seed words {}{}", w.device, w.offset))?;
        }
        for b in &self.bits {
            server
                .set_bits(&b.device, b.offset, &b.values)
                .with_context(|| format!("seed bits {}{}", b.device, b.offset))?;
        }
        tracing::info!(
            words = self.words.len(),
            bits = self.bits.len(),
            "applied seed entries"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_populates_memory() {
        let seed = Seed::from_toml_str(
            r#"
[[words]]
device = "D"
offset = 10
values = [1, 2]

[[bits]]
device = "X"
offset = 3
values = [true]
"#,
        )
        .expect("parse");
        let srv = MockServer::new();
        seed.apply(&srv).expect("apply");
        assert_eq!(srv.get_words("D", 10, 3).expect("words"), vec![1, 2, 0]);
        assert_eq!(srv.get_bits("X", 3, 1).expect("bits"), vec![true]);
    }

    #[test]
    fn unknown_device_fails_apply() {
        let seed = Seed::from_toml_str("[[words]]\ndevice = \"ZZ\"\noffset = 0\nvalues = [1]\n")
            .expect("parse");
        assert!(seed.apply(&MockServer::new()).is_err());
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(Seed::from_toml_str("[[words]]\ndevice = \"D\"\nstart = 0\nvalues = []\n").is_err());
    }
}
