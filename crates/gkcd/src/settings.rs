//! Command line and configuration file handling

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gkcache::CacheConfig;

/// Gatekeeper cache daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON cache configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Cache capacity (number of records), overrides the file
    #[arg(short, long)]
    pub max_entries: Option<u64>,

    /// Attribute TTL in seconds, overrides the file
    #[arg(short, long)]
    pub ttl: Option<u64>,

    /// Flow TTL in seconds, overrides the file
    #[arg(long)]
    pub flow_ttl: Option<u64>,

    /// Seconds between TTL sweeps (0 disables the janitor)
    #[arg(short, long, default_value_t = 60)]
    pub sweep_interval: u64,
}

impl Args {
    /// Cache policy from the config file plus command line overrides
    pub fn cache_config(&self) -> Result<CacheConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            }
            None => CacheConfig::default(),
        };

        if let Some(max_entries) = self.max_entries {
            config.max_entries = max_entries;
        }
        if let Some(ttl) = self.ttl {
            config.attribute_ttl_secs = ttl;
        }
        if let Some(ttl) = self.flow_ttl {
            config.flow_ttl_secs = ttl;
        }

        config.validate().context("Invalid cache configuration")?;
        Ok(config)
    }

    /// Janitor period
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}
