//! CLI parsing and logging setup shared by every subcommand.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fracshare_types::TradingConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// FracShare trading core node
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// JSON config file; defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Serve until Ctrl-C, sweeping expired holds and orders periodically
    Run,
    /// Play the reference trading scenarios against a fresh in-memory ledger
    Demo,
    /// Print the effective configuration and exit
    ShowConfig,
}

/// Initialize tracing/logging
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init();
    }

    Ok(())
}

/// Load and validate the trading config.
pub fn load_config(path: Option<&PathBuf>) -> Result<TradingConfig> {
    let config = match path {
        Some(path) => TradingConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            let config = TradingConfig::default();
            config.validate()?;
            config
        }
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommand_and_flags() {
        let cli = Cli::parse_from(["fracshare-node", "--json", "-l", "debug", "demo"]);
        assert!(cli.json);
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.command, Command::Demo);
        assert!(cli.config.is_none());
    }

    #[test]
    fn default_config_loads() {
        let config = load_config(None).unwrap();
        assert_eq!(config, TradingConfig::default());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = load_config(Some(&PathBuf::from("/nonexistent/fracshare.json"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fracshare.json"));
    }
}
