//! # Command Line Interface

use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;
use crate::Result;

#[derive(Debug, Parser)]
#[command(name = "acme-wfe")]
#[command(about = "ACME certificate authority web front end")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short, long, env = "ACME_WFE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen port override
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level or filter directive override
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Load configuration and apply command line overrides.
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        config.validate()?;
        Ok(config)
    }
}
