//! Outbound HTTP capability.
//!
//! The relay never talks to `reqwest` directly; it goes through [`Transport`]
//! so the forwarding and challenge flows can be driven by fakes in tests and
//! by differently-profiled clients in production.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{RelayError, Result};

/// Streamed upstream body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A fully described outbound request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl UpstreamRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Set a header, replacing any previous value.
    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        let value = HeaderValue::from_str(value).map_err(|e| {
            RelayError::InvalidRequest(format!("Invalid value for header {}: {}", name, e))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Upstream response with a streamed body.
pub struct UpstreamResponse {
    pub status: StatusCode,
    body: BodyStream,
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, body: BodyStream) -> Self {
        Self { status, body }
    }

    /// Build a response from an in-memory body.
    pub fn from_bytes(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(
            status,
            Box::pin(futures::stream::once(futures::future::ready(Ok(body)))),
        )
    }

    pub fn into_body_stream(self) -> BodyStream {
        self.body
    }

    /// Read the whole body into memory.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Read the whole body and decode it as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let body = self.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Opaque HTTP-call capability.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send a request. Errors mean the call itself failed; any HTTP status,
    /// including non-2xx, is returned as `Ok`.
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
}

/// Shared transport for use across async contexts.
pub type SharedTransport = Arc<dyn Transport>;

/// Overall timeout for forwarded requests, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Client settings for one transport profile.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall request timeout; `None` leaves requests unbounded.
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
    /// Outbound proxy (`http://`, `https://`, `socks5://`).
    pub proxy: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            connect_timeout: Duration::from_secs(20),
            proxy: None,
        }
    }
}

impl TransportConfig {
    /// Profile for challenge-related calls: no overall timeout, the solver
    /// side bounds those calls itself.
    pub fn challenge() -> Self {
        Self {
            timeout: None,
            ..Self::default()
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|p| !p.trim().is_empty());
        self
    }
}

/// `reqwest`-backed transport with its own cookie jar.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    profile: &'static str,
}

impl HttpTransport {
    /// Build a transport for the named profile.
    pub fn new(profile: &'static str, config: &TransportConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .connect_timeout(config.connect_timeout);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        match &config.proxy {
            Some(url) => {
                let proxy = reqwest::Proxy::all(url)
                    .map_err(|e| RelayError::Config(format!("Invalid proxy '{}': {}", url, e)))?;
                builder = builder.proxy(proxy);
                tracing::info!(profile, proxy = %url, "Transport using outbound proxy");
            }
            None => {
                builder = builder.no_proxy();
            }
        }

        let client = builder
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, profile })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        tracing::debug!(
            profile = self.profile,
            method = %request.method,
            url = %request.url,
            "Sending upstream request"
        );

        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            req = req.body(body);
        }

        let response = req.send().await?;
        let status = response.status();
        let body = response.bytes_stream().map_err(RelayError::from);

        Ok(UpstreamResponse::new(status, Box::pin(body)))
    }
}

/// In-memory transport that records every request and answers with a fixed reply.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct RecordingTransport {
    reply: Reply,
    requests: parking_lot::Mutex<Vec<UpstreamRequest>>,
}

#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Status(StatusCode, &'static str),
    Fail(&'static str),
}

#[cfg(test)]
impl RecordingTransport {
    pub(crate) fn replying(status: StatusCode, body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Reply::Status(status, body),
            requests: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn failing(message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Reply::Fail(message),
            requests: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        self.requests.lock().push(request);
        match &self.reply {
            Reply::Status(status, body) => Ok(UpstreamResponse::from_bytes(*status, *body)),
            Reply::Fail(message) => Err(RelayError::Network(message.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header;
    use wiremock::matchers::{body_string, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_header_rejects_invalid_value() {
        let result = UpstreamRequest::new(Method::GET, "http://localhost")
            .header(header::AUTHORIZATION, "Bearer bad\nvalue");
        assert!(matches!(result, Err(RelayError::InvalidRequest(_))));
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let config = TransportConfig::default().with_proxy(Some("http://exa mple.com".to_string()));
        let result = HttpTransport::new("default", &config);
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_challenge_profile_has_no_timeout() {
        assert!(TransportConfig::challenge().timeout.is_none());
        assert_eq!(
            TransportConfig::default().timeout,
            Some(Duration::from_secs(600))
        );
    }

    #[tokio::test]
    async fn test_from_bytes_json() {
        let response = UpstreamResponse::from_bytes(StatusCode::OK, r#"{"a":1}"#);
        let value: serde_json::Value = response.json().await.unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn test_http_transport_sends_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/backend-api/conversation"))
            .and(header_eq("authorization", "Bearer tok"))
            .and(body_string("hello"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new("default", &TransportConfig::default()).unwrap();
        let request = UpstreamRequest::new(
            Method::POST,
            format!("{}/backend-api/conversation", server.uri()),
        )
        .header(header::AUTHORIZATION, "Bearer tok")
        .unwrap()
        .with_body("hello");

        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.bytes().await.unwrap(), Bytes::from("created"));
    }

    #[tokio::test]
    async fn test_http_transport_returns_non_success_as_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new("default", &TransportConfig::default()).unwrap();
        let response = transport
            .send(UpstreamRequest::new(Method::GET, server.uri()))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_http_transport_connection_failure() {
        let transport = HttpTransport::new("default", &TransportConfig::default()).unwrap();
        let result = transport
            .send(UpstreamRequest::new(Method::GET, "http://127.0.0.1:1/"))
            .await;
        assert!(matches!(result, Err(RelayError::Network(_))));
    }
}
