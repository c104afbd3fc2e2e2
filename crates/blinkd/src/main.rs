use std::time::Duration;

use anyhow::{Context, Result};
use blink_server::{
    server::{DB_FILE_NAME, KEY_FILE_NAME},
    store::{crypto, Store},
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "blinkd",
    about = "blinkd: self-destructing snippets and short links",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Blink HTTP server
    Serve {
        /// Port to listen on (default: $BLINK_PORT or 39998)
        #[arg(long, env = "BLINK_PORT", default_value = "39998")]
        port: u16,
        /// Host to bind (default: $BLINK_HOST or 0.0.0.0)
        #[arg(long, env = "BLINK_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Log level: error, warn, info, debug, verbose (default: $BLINK_LOG_LEVEL or warn)
        #[arg(long, env = "BLINK_LOG_LEVEL")]
        log_level: Option<String>,
        /// How often expired snippets are purged, e.g. "30s" or "5m"
        #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
        sweep_interval: Duration,
    },
    /// Remove expired links and snippets (offline). Requires direct access to
    /// the blink.key and blink.db files; stop the server first.
    Cleanup,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let raw_level = match cli.command {
        Commands::Serve { ref log_level, .. } => log_level.clone(),
        Commands::Cleanup => None,
    }
    .or_else(|| std::env::var("BLINK_LOG_LEVEL").ok())
    .unwrap_or_else(|| "warn".into());
    let effective_log_level = if raw_level.eq_ignore_ascii_case("verbose") {
        "debug".to_owned()
    } else {
        raw_level
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&effective_log_level))
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            sweep_interval,
            log_level: _,
        } => cmd_serve(host, port, sweep_interval).await,

        Commands::Cleanup => cmd_cleanup(),
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16, sweep_interval: Duration) -> Result<()> {
    let cfg = blink_server::ServerConfig {
        host,
        port,
        sweep_interval,
        ..Default::default()
    };

    blink_server::run(cfg).await
}

fn cmd_cleanup() -> Result<()> {
    let data_dir_env = std::env::var("BLINK_DATA_DIR").ok().map(Into::into);
    let data_dir = blink_server::resolve_data_dir(data_dir_env.as_ref())?;

    let key_path = data_dir.join(KEY_FILE_NAME);
    let bytes = std::fs::read(&key_path)
        .with_context(|| format!("read {}, has the server been started?", key_path.display()))?;
    let key = crypto::load_key(&bytes)
        .ok_or_else(|| anyhow::anyhow!("blink.key is corrupt (expected {} bytes)", crypto::KEY_LEN))?;

    let store = Store::open(&data_dir.join(DB_FILE_NAME), key).context("open store")?;

    let links = store.cleanup_expired_links()?;
    let snippets = store.purge_expired_snippets()?;
    tracing::info!(links, snippets, "audit: offline.cleanup");

    println!("removed {links} expired link(s) and {snippets} expired snippet(s)");
    Ok(())
}
