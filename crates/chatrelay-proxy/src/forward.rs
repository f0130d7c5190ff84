//! Request forwarding to the upstream ChatGPT and platform APIs.
//!
//! Classifies the inbound path into one of three API surfaces, rewrites it
//! onto the matching upstream base, normalizes the bearer authorization and
//! relays the upstream response back unchanged.

use axum::Json;
use axum::body::Body;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use reqwest::header;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::transport::{SharedTransport, UpstreamRequest, UpstreamResponse};

/// Inbound prefix for the ChatGPT web surface.
pub const CHATGPT_PREFIX: &str = "/chatgpt";

/// Inbound prefix for the imitation surface (maps onto the web backend API).
pub const IMITATE_PREFIX: &str = "/imitate/v1";

/// Inbound prefix for the platform surface; also the fallback.
pub const PLATFORM_PREFIX: &str = "/platform";

/// ChatGPT web base URL.
pub const CHATGPT_API_URL: &str = "https://chat.openai.com";

/// Platform API base URL.
pub const PLATFORM_API_URL: &str = "https://api.openai.com";

/// Sub-path appended for the imitation surface.
pub const BACKEND_API_PATH: &str = "/backend-api";

/// User agent sent on every forwarded request.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36";

/// Key of the single-field error payload returned to callers.
pub const ERROR_MESSAGE_KEY: &str = "errorMessage";

/// Logical API surface an inbound path targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    ChatGpt,
    Imitate,
    Platform,
}

impl Surface {
    pub fn prefix(self) -> &'static str {
        match self {
            Surface::ChatGpt => CHATGPT_PREFIX,
            Surface::Imitate => IMITATE_PREFIX,
            Surface::Platform => PLATFORM_PREFIX,
        }
    }

    /// First matching prefix wins; anything unmatched is the platform surface.
    pub fn classify(path: &str) -> Self {
        [Surface::ChatGpt, Surface::Imitate]
            .into_iter()
            .find(|surface| surface.strip(path).is_some())
            .unwrap_or(Surface::Platform)
    }

    /// Remainder of `path` after this surface's prefix, when the prefix ends
    /// on a segment boundary.
    fn strip(self, path: &str) -> Option<&str> {
        path.strip_prefix(self.prefix())
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

/// Upstream bases and headers used by the forwarder.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub chatgpt_url: String,
    pub platform_url: String,
    pub user_agent: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            chatgpt_url: CHATGPT_API_URL.to_string(),
            platform_url: PLATFORM_API_URL.to_string(),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl ForwarderConfig {
    pub fn upstream_base(&self, surface: Surface) -> String {
        match surface {
            Surface::ChatGpt => self.chatgpt_url.trim_end_matches('/').to_string(),
            Surface::Imitate => format!(
                "{}{}",
                self.chatgpt_url.trim_end_matches('/'),
                BACKEND_API_PATH
            ),
            Surface::Platform => self.platform_url.trim_end_matches('/').to_string(),
        }
    }

    /// Map an inbound path and raw query onto the upstream URL.
    pub fn rewrite(&self, path: &str, query: Option<&str>) -> String {
        let surface = Surface::classify(path);
        let suffix = surface.strip(path).unwrap_or(path);
        let mut url = format!("{}{}", self.upstream_base(surface), suffix);

        if let Some(query) = query.map(reencode_query).filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(&query);
        }

        url
    }
}

/// Re-encode a query string with keys sorted; values of a repeated key keep
/// their order.
fn reencode_query(raw: &str) -> String {
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Ensure the authorization value carries the bearer scheme exactly once.
pub fn normalize_authorization(value: &str) -> String {
    if value.starts_with("Bearer") {
        value.to_string()
    } else {
        format!("Bearer {}", value)
    }
}

/// Build the single-key error payload, logging the message.
pub fn error_payload(message: &str) -> Value {
    tracing::warn!("{}", message);

    let mut payload = Map::new();
    payload.insert(
        ERROR_MESSAGE_KEY.to_string(),
        Value::String(message.to_string()),
    );
    Value::Object(payload)
}

/// One inbound call as seen by the forwarder.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Bytes,
    /// Caller-supplied authorization value, with or without the bearer scheme.
    pub authorization: String,
    /// Caller identity for diagnostics, when known.
    pub caller: Option<String>,
}

/// Forwards inbound requests over the default transport.
#[derive(Debug, Clone)]
pub struct Forwarder {
    transport: SharedTransport,
    config: ForwarderConfig,
}

impl Forwarder {
    pub fn new(transport: SharedTransport, config: ForwarderConfig) -> Self {
        Self { transport, config }
    }

    /// Build the upstream request. GET never carries a body.
    pub fn build_request(&self, inbound: &InboundRequest) -> Result<UpstreamRequest> {
        let url = self
            .config
            .rewrite(&inbound.path, inbound.query.as_deref());

        let mut request = UpstreamRequest::new(inbound.method.clone(), url)
            .header(header::USER_AGENT, &self.config.user_agent)?
            .header(
                header::AUTHORIZATION,
                &normalize_authorization(&inbound.authorization),
            )?;

        if inbound.method != Method::GET {
            request = request.with_body(inbound.body.clone());
        }

        Ok(request)
    }

    /// Forward one request and produce the caller's response.
    pub async fn forward(&self, inbound: InboundRequest) -> Response {
        // The status stays 200 unless one of the abort paths below replaces it.
        let mut status = StatusCode::OK;

        let request = match self.build_request(&inbound) {
            Ok(request) => request,
            Err(e) => {
                status = StatusCode::BAD_REQUEST;
                return (status, Json(error_payload(&e.to_string()))).into_response();
            }
        };

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                status = StatusCode::INTERNAL_SERVER_ERROR;
                return (status, Json(error_payload(&e.to_string()))).into_response();
            }
        };

        if response.status != StatusCode::OK {
            return relay_rejection(response, inbound.caller.as_deref()).await;
        }

        (status, Body::from_stream(response.into_body_stream())).into_response()
    }
}

/// Relay a non-200 upstream answer with its original status.
async fn relay_rejection(response: UpstreamResponse, caller: Option<&str>) -> Response {
    let status = response.status;

    if status == StatusCode::UNAUTHORIZED {
        tracing::error!(
            caller = caller.unwrap_or("unknown"),
            "Upstream rejected caller as unauthorized, account may be deactivated"
        );
    }

    let body = decode_object(response).await;
    (status, Json(Value::Object(body))).into_response()
}

/// Decode a JSON object body; anything undecodable becomes an empty object.
async fn decode_object(response: UpstreamResponse) -> Map<String, Value> {
    match response.json::<Map<String, Value>>().await {
        Ok(map) => map,
        Err(e) => {
            tracing::debug!(error = %e, "Upstream error body is not a JSON object");
            Map::new()
        }
    }
}
