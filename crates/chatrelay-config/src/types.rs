//! Configuration types.
//!
//! Every section is `#[serde(default)]`, so an empty file (or no file) yields
//! a working relay pointed at the public upstreams.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use chatrelay_proxy::arkose::DEFAULT_MODEL_VERSION;
use chatrelay_proxy::forward::{CHATGPT_API_URL, PLATFORM_API_URL, USER_AGENT};
use chatrelay_proxy::transport::DEFAULT_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default listener address.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default listener port.
pub const DEFAULT_PORT: u16 = 8080;

/// Seconds between PUID refreshes (7 days).
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Placeholder printed instead of secrets.
pub const REDACTED: &str = "********";

// ─────────────────────────────────────────────────────────────────────────────
// Root Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration for the relay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub refresh: RefreshConfig,
    pub arkose: ArkoseConfig,
    pub logging: LoggingConfig,
    /// Operator account; only ever populated from the environment.
    #[serde(skip)]
    pub operator: Option<OperatorConfig>,
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string. Operator credentials are never written.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Render the effective configuration for display, including the
    /// operator account with its password redacted.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut value = toml::Value::try_from(self)?;
        if let (Some(operator), Some(table)) = (&self.operator, value.as_table_mut()) {
            let mut section = toml::map::Map::new();
            section.insert(
                "email".to_string(),
                toml::Value::String(operator.email.clone()),
            );
            section.insert(
                "password".to_string(),
                toml::Value::String(REDACTED.to_string()),
            );
            table.insert("operator".to_string(), toml::Value::Table(section));
        }
        Ok(toml::to_string_pretty(&value)?)
    }

    /// Check values that parse fine but cannot work.
    pub fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;

        for (field, url) in [
            ("upstream.chatgpt_url", &self.upstream.chatgpt_url),
            ("upstream.platform_url", &self.upstream.platform_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: format!("'{}' is not an http(s) URL", url),
                });
            }
        }

        if self.upstream.timeout_secs == 0 {
            return Err(invalid("upstream.timeout_secs", "must be greater than zero"));
        }
        if self.refresh.interval_secs == 0 {
            return Err(invalid("refresh.interval_secs", "must be greater than zero"));
        }
        if self.arkose.model_version == 0 {
            return Err(invalid("arkose.model_version", "must be greater than zero"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Add permissive CORS headers.
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            enable_cors: false,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.bind.parse().map_err(|_| ConfigError::Invalid {
            field: "server.bind".to_string(),
            reason: format!("'{}' is not an IP address", self.bind),
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Upstream Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Upstream endpoints and outbound client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub chatgpt_url: String,
    pub platform_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Outbound proxy; the `PROXY` environment variable overrides it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            chatgpt_url: CHATGPT_API_URL.to_string(),
            platform_url: PLATFORM_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: USER_AGENT.to_string(),
            proxy: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Refresh / Arkose
// ─────────────────────────────────────────────────────────────────────────────

/// Background PUID refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    /// Login service used to turn the operator account into a PUID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_service_url: Option<String>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            auth_service_url: None,
        }
    }
}

/// Challenge token acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArkoseConfig {
    pub model_version: u8,
    /// Solver service; without one, token requests fail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver_url: Option<String>,
}

impl Default for ArkoseConfig {
    fn default() -> Self {
        Self {
            model_version: DEFAULT_MODEL_VERSION,
            solver_url: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Log file settings. Console logging is always on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the daily JSON log file. Defaults to the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Operator Account
// ─────────────────────────────────────────────────────────────────────────────

/// Operator account used for the PUID refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    pub email: String,
    pub password: String,
}

impl OperatorConfig {
    /// Both parts must be non-empty.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Option<Self> {
        let email = email.into();
        let password = password.into();
        if email.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self { email, password })
    }
}

impl fmt::Debug for OperatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorConfig")
            .field("email", &self.email)
            .field("password", &REDACTED)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RelayConfig::from_toml("").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.upstream.chatgpt_url, "https://chat.openai.com");
        assert_eq!(config.upstream.timeout_secs, 600);
        assert_eq!(config.refresh.interval_secs, 604_800);
        assert_eq!(config.arkose.model_version, 4);
        assert!(config.operator.is_none());
    }

    #[test]
    fn test_defaults_follow_relay_defaults() {
        let config = RelayConfig::default();
        let forwarder = chatrelay_proxy::ForwarderConfig::default();
        assert_eq!(config.upstream.chatgpt_url, forwarder.chatgpt_url);
        assert_eq!(config.upstream.platform_url, forwarder.platform_url);
        assert_eq!(config.upstream.user_agent, forwarder.user_agent);
        assert_eq!(
            Some(std::time::Duration::from_secs(config.upstream.timeout_secs)),
            chatrelay_proxy::TransportConfig::default().timeout
        );
        assert_eq!(
            config.arkose.model_version,
            chatrelay_proxy::ProxyConfig::default().model_version
        );
    }

    #[test]
    fn test_parse_full_config() {
        let config = RelayConfig::from_toml(
            r#"
[server]
bind = "0.0.0.0"
port = 9000
enable_cors = true

[upstream]
platform_url = "http://localhost:4000"
proxy = "socks5://127.0.0.1:1080"

[refresh]
interval_secs = 60
auth_service_url = "http://localhost:7000/login"

[arkose]
solver_url = "http://localhost:7001/solve"

[logging]
dir = "/var/log/chatrelay"
"#,
        )
        .unwrap();

        assert_eq!(config.server.socket_addr().unwrap().to_string(), "0.0.0.0:9000");
        assert!(config.server.enable_cors);
        assert_eq!(config.upstream.platform_url, "http://localhost:4000");
        assert_eq!(config.upstream.chatgpt_url, CHATGPT_API_URL);
        assert_eq!(config.upstream.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(config.refresh.interval_secs, 60);
        assert_eq!(
            config.arkose.solver_url.as_deref(),
            Some("http://localhost:7001/solve")
        );
        assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/chatrelay")));
        config.validate().unwrap();
    }

    #[test]
    fn test_operator_is_never_read_from_file() {
        let config = RelayConfig::from_toml(
            r#"
[operator]
email = "ops@example.com"
password = "secret"
"#,
        )
        .unwrap();
        assert!(config.operator.is_none());
    }

    #[test]
    fn test_to_toml_round_trips_without_operator() {
        let mut config = RelayConfig::default();
        config.server.port = 9999;
        config.operator = OperatorConfig::new("ops@example.com", "secret");

        let text = config.to_toml().unwrap();
        assert!(!text.contains("secret"));
        assert!(!text.contains("ops@example.com"));

        let parsed = RelayConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.server.port, 9999);
    }

    #[test]
    fn test_redacted_toml_hides_password() {
        let mut config = RelayConfig::default();
        config.operator = OperatorConfig::new("ops@example.com", "hunter2");

        let text = config.to_redacted_toml().unwrap();
        assert!(text.contains("ops@example.com"));
        assert!(text.contains(REDACTED));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_operator_requires_both_parts() {
        assert!(OperatorConfig::new("ops@example.com", "").is_none());
        assert!(OperatorConfig::new("", "secret").is_none());
        let operator = OperatorConfig::new("ops@example.com", "secret").unwrap();
        assert!(!format!("{:?}", operator).contains("secret"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RelayConfig::default();
        config.server.bind = "not-an-ip".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "server.bind"
        ));

        let mut config = RelayConfig::default();
        config.upstream.chatgpt_url = "chat.openai.com".to_string();
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.refresh.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.arkose.model_version = 0;
        assert!(config.validate().is_err());
    }
}
