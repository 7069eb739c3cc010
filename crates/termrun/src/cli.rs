//! Command-line arguments and configuration loading.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use termrun_core::ServerConfig;

/// termrun - MCP server for interactive code execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Parser)]
#[command(name = "termrun")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Configuration file (default: <config dir>/termrun/config.yaml if present)
    #[arg(long, short, value_name = "PATH", env = "TERMRUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level overriding the configuration (e.g. "debug", "termrun=trace")
    #[arg(long, short, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Load the configuration these arguments point at.
    ///
    /// A file named by `--config` (or `$TERMRUN_CONFIG`) must exist.
    /// Otherwise `<config dir>/termrun/config.yaml` is used when present,
    /// and the defaults when not.
    pub fn load_config(&self) -> anyhow::Result<ServerConfig> {
        let path = self
            .config
            .clone()
            .or_else(|| default_config_path().filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => ServerConfig::from_file(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(level) = &self.log_level {
            config.server.log_level = level.clone();
        }
        Ok(config)
    }
}

/// `<config dir>/termrun/config.yaml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("termrun").join("config.yaml"))
}
