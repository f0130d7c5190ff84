//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use chatrelay_config::{CONFIG_ENV, RelayConfig};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration (secrets redacted)
    Show,

    /// Show which config file is used and the search order
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./chatrelay.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show the user configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local } => cmd_init(local),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    loaded.config.validate()?;

    match &loaded.source {
        Some(path) => println!("# Loaded from {}\n", path.display()),
        None => println!("# No config file found (using defaults)\n"),
    }
    print!("{}", loaded.config.to_redacted_toml()?);

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (first found wins):\n");

    let explicit = ctx
        .config_path
        .as_ref()
        .map(|p| format!("--config {}", p.display()))
        .unwrap_or_else(|| "--config (not given)".to_string());
    println!("  1. {}", explicit);

    let from_env = std::env::var(CONFIG_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "(not set)".to_string());
    println!("  2. {} = {}", CONFIG_ENV, from_env);

    let user = chatrelay_config::user_config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(no user config directory)".to_string());
    println!("  3. {}", user);
    println!("  4. ./chatrelay.toml");
    println!();

    let loaded = ctx.load_config()?;
    match loaded.source {
        Some(path) => println!("Using: {}", path.display()),
        None => println!("No config file found. Run 'chatrelay config init' to create one."),
    }

    Ok(())
}

fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from("chatrelay.toml")
    } else {
        chatrelay_config::user_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    chatrelay_config::save_config(&RelayConfig::default(), &path)?;
    println!("Created {}", path.display());
    println!("Operator credentials are read from OPENAI_EMAIL and OPENAI_PASSWORD.");

    Ok(())
}

fn cmd_path() -> Result<()> {
    if let Some(path) = chatrelay_config::user_config_path() {
        println!("{}", path.display());
    } else {
        eprintln!("Could not determine config directory");
    }
    Ok(())
}
