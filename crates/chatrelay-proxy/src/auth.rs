//! Operator authentication capability.
//!
//! The username/password login that yields an access token and PUID lives
//! outside this crate. [`Authenticator`] is the seam; [`HttpAuthenticator`]
//! reaches a login service over HTTP.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Operator account used by the refresh loop.
#[derive(Clone, PartialEq, Eq)]
pub struct OperatorCredentials {
    username: String,
    password: String,
}

impl OperatorCredentials {
    /// Returns `None` unless both parts are non-empty.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Option<Self> {
        let username = username.into();
        let password = password.into();
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for OperatorCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Outcome of a successful login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub puid: String,
}

impl AuthSession {
    pub fn new(access_token: impl Into<String>, puid: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            puid: puid.into(),
        }
    }
}

/// Username/password login capability.
#[async_trait]
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// Log in and return the access token and session credential.
    async fn authenticate(
        &self,
        credentials: &OperatorCredentials,
        proxy: Option<&str>,
    ) -> Result<AuthSession>;
}

/// Shared authenticator for use across async contexts.
pub type SharedAuthenticator = Arc<dyn Authenticator>;

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<&'a str>,
}

/// Authenticator backed by an HTTP login service.
///
/// Posts `{username, password, proxy}` and expects `{accessToken, puid}`.
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuthenticator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(
        &self,
        credentials: &OperatorCredentials,
        proxy: Option<&str>,
    ) -> Result<AuthSession> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&LoginRequest {
                username: credentials.username(),
                password: credentials.password(),
                proxy,
            })
            .send()
            .await
            .map_err(|e| RelayError::Network(format!("Login request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RelayError::Authentication(format!(
                "login service returned {}: {}",
                status, error_text
            )));
        }

        response.json::<AuthSession>().await.map_err(|e| {
            RelayError::Authentication(format!("Failed to parse login response: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_credentials_require_both_parts() {
        assert!(OperatorCredentials::new("", "secret").is_none());
        assert!(OperatorCredentials::new("ops@example.com", "").is_none());
        let creds = OperatorCredentials::new("ops@example.com", "secret").unwrap();
        assert_eq!(creds.username(), "ops@example.com");
        assert_eq!(creds.password(), "secret");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = OperatorCredentials::new("ops@example.com", "hunter2").unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ops@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_http_authenticator_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(serde_json::json!({
                "username": "ops@example.com",
                "password": "secret",
                "proxy": "socks5://127.0.0.1:1080"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"accessToken": "T1", "puid": "P1"})),
            )
            .mount(&server)
            .await;

        let auth = HttpAuthenticator::new(format!("{}/login", server.uri()));
        let creds = OperatorCredentials::new("ops@example.com", "secret").unwrap();
        let session = auth
            .authenticate(&creds, Some("socks5://127.0.0.1:1080"))
            .await
            .unwrap();

        assert_eq!(session, AuthSession::new("T1", "P1"));
    }

    #[tokio::test]
    async fn test_http_authenticator_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("email or password is not correct"))
            .mount(&server)
            .await;

        let auth = HttpAuthenticator::new(server.uri());
        let creds = OperatorCredentials::new("ops@example.com", "wrong").unwrap();
        let err = auth.authenticate(&creds, None).await.unwrap_err();

        assert!(matches!(err, RelayError::Authentication(_)));
        assert!(err.to_string().contains("not correct"));
    }

    #[tokio::test]
    async fn test_http_authenticator_missing_fields_default_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"accessToken": "T1"})))
            .mount(&server)
            .await;

        let auth = HttpAuthenticator::new(server.uri());
        let creds = OperatorCredentials::new("ops@example.com", "secret").unwrap();
        let session = auth.authenticate(&creds, None).await.unwrap();

        assert_eq!(session.access_token, "T1");
        assert!(session.puid.is_empty());
    }
}
