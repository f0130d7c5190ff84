//! Configuration for the chatrelay proxy.
//!
//! Provides TOML-based configuration with:
//! - Listener, upstream, refresh, challenge and logging sections
//! - Config file discovery (explicit path, `CHATRELAY_CONFIG`, user config dir, `./chatrelay.toml`)
//! - Environment overlay (`PROXY`, `OPENAI_EMAIL`/`OPENAI_PASSWORD`, listener overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_ENV, LoadedConfig, apply_env, load_config, load_config_file, load_config_with, save_config,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
