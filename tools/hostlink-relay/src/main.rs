//! Hostlink Relay Server
//!
//! Standalone relay bridging a plugin's panel process to the editor
//! host's scripting runtime. Exits 0 on clean shutdown, non-zero when
//! the listen port cannot be bound.

use anyhow::{bail, Context, Result};
use clap::Parser;
use hostlink_core::DEFAULT_WS_PORT;
use hostlink_relay::{Allowlist, RelayConfig, RelayServer};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hostlink-relay")]
#[command(about = "Hostlink panel/host relay server")]
#[command(version)]
struct Cli {
    /// Listen port
    #[arg(short, long, default_value_t = DEFAULT_WS_PORT)]
    port: u16,

    /// Listen host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server identity (shown in welcome)
    #[arg(short, long, default_value = "Hostlink Relay")]
    name: String,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value = "64")]
    max_connections: usize,

    /// Per-connection drain timeout during shutdown, in milliseconds
    #[arg(long, default_value = "2000")]
    drain_timeout_ms: u64,

    /// How long a forwarded action may stay unanswered, in milliseconds
    #[arg(long, default_value = "30000")]
    request_timeout_ms: u64,

    /// Reject domain actions from unregistered connections
    #[arg(long)]
    require_registration: bool,

    /// Allow-list entry as IDENTITY=cap1,cap2 (repeatable; replaces
    /// the built-in allow-list)
    #[arg(long = "allow", value_name = "IDENTITY=CAPS")]
    allow: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_allowlist(entries: &[String]) -> Result<Allowlist> {
    let mut allowlist = Allowlist::new();
    for entry in entries {
        let (identity, caps) = entry
            .split_once('=')
            .with_context(|| format!("invalid --allow entry `{entry}`, expected IDENTITY=CAPS"))?;
        if identity.is_empty() {
            bail!("invalid --allow entry `{entry}`: empty identity");
        }
        let capabilities: Vec<String> = caps
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        allowlist.insert(identity.trim().to_string(), capabilities);
    }
    Ok(allowlist)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let allowlist = if cli.allow.is_empty() {
        Allowlist::default()
    } else {
        parse_allowlist(&cli.allow)?
    };

    let config = RelayConfig {
        server_identity: cli.name.clone(),
        max_connections: cli.max_connections,
        drain_timeout: Duration::from_millis(cli.drain_timeout_ms),
        request_timeout: Duration::from_millis(cli.request_timeout_ms),
        require_registration: cli.require_registration,
        allowlist,
    };

    let relay = Arc::new(RelayServer::new(config));
    let addr = format!("{}:{}", cli.host, cli.port);

    tracing::info!("Starting Hostlink Relay");
    tracing::info!("Listening on: ws://{}", addr);

    tokio::select! {
        result = relay.serve_websocket(&addr) => {
            // Bind failure lands here and aborts startup
            result.context("relay server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("termination signal received");
            relay.shutdown().await;
        }
    }

    Ok(())
}
