use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use melsec_mcp_mock::{MockServer, Seed};

/// Mock MELSEC PLC answering MC protocol 3E and 1E binary frames.
#[derive(Parser, Debug)]
#[command(name = "melsec-mcp-mock", version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:5000")]
    listen: SocketAddr,

    /// TOML file with initial device values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print non-zero device memory as JSON on exit
    #[arg(long)]
    dump_json: bool,

    /// Answer every request with this end code (hex, e.g. C059)
    #[arg(long, value_parser = parse_end_code)]
    end_code: Option<u16>,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_end_code(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| format!("{s}: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut server = MockServer::new();
    if let Some(code) = args.end_code {
        server = server.with_forced_end_code(code);
    }
    if let Some(path) = &args.config {
        Seed::from_path(path)?.apply(&server)?;
    }

    let listener = MockServer::bind(args.listen)
        .with_context(|| format!("failed to bind {}", args.listen))?;
    tracing::info!(addr = %args.listen, "mock PLC listening");

    tokio::select! {
        res = server.run_listener_on(listener) => res?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    if args.dump_json {
        println!("{}", serde_json::to_string_pretty(&server.snapshot_json())?);
    }
    Ok(())
}
