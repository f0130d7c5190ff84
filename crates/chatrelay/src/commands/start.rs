//! Start command - run the relay in the foreground.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use chatrelay_config::RelayConfig;
use chatrelay_proxy::{
    CredentialStore, DisabledSolver, ForwarderConfig, HttpAuthenticator, HttpChallengeSolver,
    HttpTransport, OperatorCredentials, ProxyConfig, ProxyServer, SharedSolver, TransportConfig,
    Transports, start_refresh,
};

use super::Context;

/// Arguments for the start command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Add permissive CORS headers (overrides config)
    #[arg(long)]
    pub cors: bool,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    // ── Load configuration ──────────────────────────────────────────────

    let loaded = ctx.load_config()?;
    let mut config = loaded.config;
    apply_overrides(&mut config, &args);
    config.validate()?;

    match &loaded.source {
        Some(path) => tracing::info!(path = %path.display(), "Loaded config"),
        None => tracing::info!("No config file found, using defaults"),
    }

    let bind_addr = config.server.socket_addr()?;

    // ── Shared state and capabilities ───────────────────────────────────

    let credentials = CredentialStore::shared(config.upstream.proxy.clone());

    let default_transport = HttpTransport::new(
        "default",
        &TransportConfig {
            timeout: Some(Duration::from_secs(config.upstream.timeout_secs)),
            ..TransportConfig::default()
        }
        .with_proxy(config.upstream.proxy.clone()),
    )
    .context("Failed to build default transport")?;

    let challenge_transport = HttpTransport::new(
        "challenge",
        &TransportConfig::challenge().with_proxy(config.upstream.proxy.clone()),
    )
    .context("Failed to build challenge transport")?;

    let solver: SharedSolver = match &config.arkose.solver_url {
        Some(url) => Arc::new(HttpChallengeSolver::new(url.clone())),
        None => {
            tracing::warn!("No challenge solver configured, /arkose/token will fail");
            Arc::new(DisabledSolver)
        }
    };

    // ── Background refresh ──────────────────────────────────────────────

    let cancel = CancellationToken::new();

    let operator = config
        .operator
        .as_ref()
        .and_then(|op| OperatorCredentials::new(op.email.as_str(), op.password.as_str()));

    let refresh = match &config.refresh.auth_service_url {
        Some(url) => start_refresh(
            Arc::new(HttpAuthenticator::new(url.clone())),
            operator,
            credentials.clone(),
            Duration::from_secs(config.refresh.interval_secs),
            cancel.child_token(),
        ),
        None => {
            if operator.is_some() {
                tracing::warn!(
                    "Operator credentials set but refresh.auth_service_url is missing, PUID refresh disabled"
                );
            }
            None
        }
    };

    // ── Server ──────────────────────────────────────────────────────────

    let proxy_config = ProxyConfig::new(bind_addr)
        .with_forwarder(ForwarderConfig {
            chatgpt_url: config.upstream.chatgpt_url.clone(),
            platform_url: config.upstream.platform_url.clone(),
            user_agent: config.upstream.user_agent.clone(),
        })
        .with_cors(config.server.enable_cors)
        .with_model_version(config.arkose.model_version);

    let server = ProxyServer::new(
        proxy_config,
        credentials,
        Transports {
            default: Arc::new(default_transport),
            challenge: Arc::new(challenge_transport),
        },
        solver,
    );

    let addr = server
        .run_with_shutdown(cancel.clone().cancelled_owned())
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    println!("chatrelay listening on http://{}", addr);
    if ctx.verbose {
        println!("ChatGPT upstream:  {}", config.upstream.chatgpt_url);
        println!("Platform upstream: {}", config.upstream.platform_url);
    }

    // ── Graceful shutdown ───────────────────────────────────────────────

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutdown requested, stopping relay");
    cancel.cancel();

    if let Some(handle) = refresh {
        handle.shutdown().await;
    }

    Ok(())
}

/// Apply command-line overrides on top of file and environment settings.
fn apply_overrides(config: &mut RelayConfig, args: &StartArgs) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if args.cors {
        config.server.enable_cors = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = RelayConfig::default();
        let args = StartArgs {
            port: Some(9999),
            bind: Some("0.0.0.0".to_string()),
            cors: true,
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert!(config.server.enable_cors);
    }

    #[test]
    fn test_absent_overrides_keep_config() {
        let mut config = RelayConfig::default();
        config.server.enable_cors = true;
        let args = StartArgs {
            port: None,
            bind: None,
            cors: false,
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.server.port, 8080);
        assert!(config.server.enable_cors);
    }
}
