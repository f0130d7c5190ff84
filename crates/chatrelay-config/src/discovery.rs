//! Config file discovery and environment overlay.
//!
//! The first file found wins (no layering):
//! 1. Explicit path (`--config`)
//! 2. `CHATRELAY_CONFIG`
//! 3. `<config_dir>/chatrelay/config.toml`
//! 4. `./chatrelay.toml`
//!
//! An explicit or env-named file must exist; the implicit locations are
//! skipped when absent. With no file at all, defaults apply. Environment
//! variables are overlaid afterwards.

use std::path::{Path, PathBuf};

use crate::{ConfigError, OperatorConfig, RelayConfig, Result};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CHATRELAY_CONFIG";

/// Outbound proxy override.
pub const PROXY_ENV: &str = "PROXY";

/// Operator account email.
pub const EMAIL_ENV: &str = "OPENAI_EMAIL";

/// Operator account password.
pub const PASSWORD_ENV: &str = "OPENAI_PASSWORD";

/// Listener address override.
pub const BIND_ENV: &str = "CHATRELAY_BIND";

/// Listener port override.
pub const PORT_ENV: &str = "CHATRELAY_PORT";

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "chatrelay.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for config directory resolution.
const APP_NAME: &str = "chatrelay";

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Effective configuration, environment included.
    pub config: RelayConfig,
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
}

/// Load configuration from the process environment.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with(explicit, |key| std::env::var(key).ok())
}

/// Load configuration with an injected environment lookup.
pub fn load_config_with<F>(explicit: Option<&Path>, lookup: F) -> Result<LoadedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let required = explicit
        .map(Path::to_path_buf)
        .or_else(|| non_empty(&lookup, CONFIG_ENV).map(PathBuf::from));

    let source = match required {
        Some(path) => Some(path),
        None => [user_config_path(), Some(PathBuf::from(PROJECT_CONFIG_FILE))]
            .into_iter()
            .flatten()
            .find(|path| path.is_file()),
    };

    let mut config = match &source {
        Some(path) => load_config_file(path)?,
        None => RelayConfig::new(),
    };

    apply_env(&mut config, lookup)?;

    Ok(LoadedConfig { config, source })
}

/// Load config from a specific file path (no discovery, no environment).
pub fn load_config_file(path: &Path) -> Result<RelayConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    RelayConfig::from_toml(&contents)
}

/// Overlay environment variables onto `config`. Empty values count as unset.
pub fn apply_env<F>(config: &mut RelayConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(proxy) = non_empty(&lookup, PROXY_ENV) {
        config.upstream.proxy = Some(proxy);
    }

    if let Some(bind) = non_empty(&lookup, BIND_ENV) {
        config.server.bind = bind;
    }

    if let Some(port) = non_empty(&lookup, PORT_ENV) {
        config.server.port = port.parse().map_err(|_| ConfigError::Invalid {
            field: PORT_ENV.to_string(),
            reason: format!("'{}' is not a port number", port),
        })?;
    }

    config.operator = match (
        non_empty(&lookup, EMAIL_ENV),
        non_empty(&lookup, PASSWORD_ENV),
    ) {
        (Some(email), Some(password)) => OperatorConfig::new(email, password),
        _ => None,
    };

    Ok(())
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &RelayConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Get the user config file path (`~/.config/chatrelay/config.toml` on Linux).
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the user config directory for chatrelay.
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_user_config_path_shape() {
        if let Some(p) = user_config_path() {
            assert!(p.ends_with("chatrelay/config.toml"));
        }
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/chatrelay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_explicit_path_wins_over_env() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("explicit.toml");
        let from_env = dir.path().join("env.toml");
        fs::write(&explicit, "[server]\nport = 1111\n").unwrap();
        fs::write(&from_env, "[server]\nport = 2222\n").unwrap();
        let env_path = from_env.display().to_string();

        let loaded = load_config_with(
            Some(&explicit),
            env(&[(CONFIG_ENV, env_path.as_str())]),
        )
        .unwrap();

        assert_eq!(loaded.config.server.port, 1111);
        assert_eq!(loaded.source.as_deref(), Some(explicit.as_path()));
    }

    #[test]
    fn test_env_named_file_is_used() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.toml");
        fs::write(&path, "[arkose]\nmodel_version = 3\n").unwrap();
        let env_path = path.display().to_string();

        let loaded = load_config_with(None, env(&[(CONFIG_ENV, env_path.as_str())])).unwrap();

        assert_eq!(loaded.config.arkose.model_version, 3);
        assert_eq!(loaded.source, Some(path));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = load_config_with(Some(&missing), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_proxy_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[upstream]\nproxy = \"http://file-proxy:8080\"\n").unwrap();

        let loaded = load_config_with(
            Some(&path),
            env(&[(PROXY_ENV, "socks5://127.0.0.1:1080")]),
        )
        .unwrap();

        assert_eq!(
            loaded.config.upstream.proxy.as_deref(),
            Some("socks5://127.0.0.1:1080")
        );
    }

    #[test]
    fn test_empty_env_values_are_unset() {
        let mut config = RelayConfig::default();
        config.upstream.proxy = Some("http://file-proxy:8080".to_string());

        apply_env(
            &mut config,
            env(&[(PROXY_ENV, ""), (BIND_ENV, " "), (PORT_ENV, "")]),
        )
        .unwrap();

        assert_eq!(config.upstream.proxy.as_deref(), Some("http://file-proxy:8080"));
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_operator_requires_both_env_vars() {
        let mut config = RelayConfig::default();
        apply_env(&mut config, env(&[(EMAIL_ENV, "ops@example.com")])).unwrap();
        assert!(config.operator.is_none());

        apply_env(
            &mut config,
            env(&[(EMAIL_ENV, "ops@example.com"), (PASSWORD_ENV, "")]),
        )
        .unwrap();
        assert!(config.operator.is_none());

        apply_env(
            &mut config,
            env(&[(EMAIL_ENV, "ops@example.com"), (PASSWORD_ENV, "secret")]),
        )
        .unwrap();
        let operator = config.operator.unwrap();
        assert_eq!(operator.email, "ops@example.com");
        assert_eq!(operator.password, "secret");
    }

    #[test]
    fn test_listener_overrides() {
        let mut config = RelayConfig::default();
        apply_env(
            &mut config,
            env(&[(BIND_ENV, "0.0.0.0"), (PORT_ENV, "9090")]),
        )
        .unwrap();
        assert_eq!(config.server.socket_addr().unwrap().to_string(), "0.0.0.0:9090");
    }

    #[test]
    fn test_bad_port_env_is_invalid() {
        let mut config = RelayConfig::default();
        let err = apply_env(&mut config, env(&[(PORT_ENV, "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == PORT_ENV));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = RelayConfig::default();
        config.server.port = 4321;
        config.refresh.auth_service_url = Some("http://localhost:7000/login".to_string());

        save_config(&config, &path).unwrap();
        let reloaded = load_config_file(&path).unwrap();

        assert_eq!(reloaded, config);
    }
}
