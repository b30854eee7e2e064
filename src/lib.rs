#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::doc_markdown,
    clippy::too_long_first_doc_paragraph
)]

//! melsec_mcp
//!
//! melsec_mcp は Mitsubishi PLC (MELSEC) の MC プロトコル (1E / 3E バイナリフレーム) を
//! TCP で扱うクライアントライブラリです。
//!
//! Layers:
//! - `station`: request frame encoders (`Station3E`, `Station1E`), producing hex text
//! - `parser`: response decoders (`Parser3E`, `Parser1E`) into `Response`
//! - `client`: `McpClient`, one TCP session driving encode -> send -> receive
//! - `device_code`: the device class table ("D" -> 0xA8, ...)
//!
//! ```no_run
//! use melsec_mcp::{Client3E, Parser, Station, Station3E};
//!
//! # async fn demo() -> Result<(), melsec_mcp::McpError> {
//! let mut client = Client3E::open("192.168.1.40", 5000, Station3E::local()).await?;
//! client.health_check().await?;
//! let raw = client.read("D", 100, 10).await?;
//! let resp = client.station().parser().process(&raw)?.check_end_code()?;
//! println!("{:?}", resp.words());
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod device_code;
pub mod end_code;
pub mod error;
pub mod frame;
pub mod parser;
pub mod station;

pub use client::{Client1E, Client3E, McpClient};
pub use config::ClientConfig;
pub use device_code::{DeviceCode, DeviceKind};
pub use error::McpError;
pub use frame::{AccessRoute, FrameVersion};
pub use parser::{new_parser, Parser, Parser1E, Parser3E, Response};
pub use station::{Station, Station1E, Station3E};
