//! CLI command handlers.

use std::path::PathBuf;

use chatrelay_config::LoadedConfig;

pub mod config;
pub mod start;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Config file given on the command line.
    pub config_path: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Discover and load the effective configuration.
    pub fn load_config(&self) -> chatrelay_config::Result<LoadedConfig> {
        chatrelay_config::load_config(self.config_path.as_deref())
    }
}
