//! Gatekeeper cache daemon
//!
//! Reads JSON commands from stdin, one per line, and writes one JSON reply
//! per line to stdout. Logs go to stderr.

mod command;
mod handler;
mod janitor;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use gkcache::GatekeeperCache;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::handler::CommandHandler;
use crate::janitor::Janitor;
use crate::settings::Args;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(&std::env::var("RUST_LOG").unwrap_or_default()))
        .init();

    let args = Args::parse();
    let config = args.cache_config()?;

    info!("Starting Gatekeeper cache daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Cache capacity: {}", config.max_entries);
    info!(
        "Default TTL: {}s attributes, {}s flows",
        config.attribute_ttl_secs, config.flow_ttl_secs
    );

    let cache = GatekeeperCache::new(config).context("Failed to initialize cache")?;
    let janitor = Janitor::new(cache.clone(), args.sweep_interval()).spawn();
    let handler = CommandHandler::new(cache.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line.context("Failed to read stdin")? {
                    Some(line) => line,
                    None => {
                        info!("stdin closed");
                        break;
                    }
                };

                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let mut reply = handler.handle_line(line);
                reply.push('\n');
                stdout
                    .write_all(reply.as_bytes())
                    .await
                    .context("Failed to write reply")?;
                stdout.flush().await.context("Failed to flush stdout")?;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
                break;
            }
        }
    }

    if let Some(handle) = janitor {
        handle.abort();
    }

    cache.cleanup();
    let stats = cache.stats().snapshot();
    info!(
        "Final stats: {} hits, {} misses, {} inserts, {} TTL evictions, {} purged, hit ratio {:.2}",
        stats.hits,
        stats.misses,
        stats.inserts,
        stats.ttl_evictions,
        stats.purged,
        stats.hit_ratio
    );

    Ok(())
}

/// Log filter from `RUST_LOG` style directives, INFO when none are given
fn log_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives)
}
