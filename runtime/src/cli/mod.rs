//! CLI subcommand implementations for the pitchfeed binary.

pub mod once;
pub mod start;
pub mod status;
pub mod stop;

use crate::config::{Config, ConfigError};
use std::path::PathBuf;

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub data_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
}

impl GlobalOptions {
    /// Data directory without loading credentials: flag, then
    /// `PITCHFEED_DATA_DIR`, then the working directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| {
                std::env::var("PITCHFEED_DATA_DIR")
                    .ok()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Environment configuration with CLI overrides applied.
pub fn load_config(opts: &GlobalOptions) -> Result<Config, ConfigError> {
    let mut config = Config::from_env()?;
    apply_overrides(&mut config, opts);
    Ok(config)
}

fn apply_overrides(config: &mut Config, opts: &GlobalOptions) {
    if let Some(dir) = &opts.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(n) = opts.concurrency {
        config.concurrency = n.max(1);
    }
}
