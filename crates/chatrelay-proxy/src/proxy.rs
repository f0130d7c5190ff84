//! HTTP front end of the relay.
//!
//! Serves a health probe and the challenge-token endpoint; every other
//! method and path goes to the [`Forwarder`].

use axum::{
    Extension, Json, Router as AxumRouter,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::arkose::{ArkoseFlow, DEFAULT_MODEL_VERSION, SharedSolver};
use crate::credentials::SharedCredentials;
use crate::error::RelayError;
use crate::forward::{Forwarder, ForwarderConfig, InboundRequest, error_payload};
use crate::transport::SharedTransport;

/// Fallback header carrying the caller's authorization.
pub const X_AUTHORIZATION: &str = "x-authorization";

/// Header naming the caller, used only for diagnostics.
pub const X_CALLER_EMAIL: &str = "x-caller-email";

/// Caller identity attached by an outer middleware layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

/// Configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_addr: SocketAddr,
    pub enable_cors: bool,
    pub forwarder: ForwarderConfig,
    /// Model version handed to the challenge solver.
    pub model_version: u8,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            enable_cors: false,
            forwarder: ForwarderConfig::default(),
            model_version: DEFAULT_MODEL_VERSION,
        }
    }
}

impl ProxyConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_forwarder(mut self, forwarder: ForwarderConfig) -> Self {
        self.forwarder = forwarder;
        self
    }

    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    pub fn with_model_version(mut self, version: u8) -> Self {
        self.model_version = version;
        self
    }
}

/// The two outbound transport profiles.
#[derive(Debug, Clone)]
pub struct Transports {
    /// Used for forwarded traffic.
    pub default: SharedTransport,
    /// Used for the chat-requirements handshake.
    pub challenge: SharedTransport,
}

/// Shared state for the proxy server.
#[derive(Debug)]
struct ProxyState {
    forwarder: Forwarder,
    arkose: ArkoseFlow,
    credentials: SharedCredentials,
}

/// The relay server.
pub struct ProxyServer {
    config: ProxyConfig,
    state: Arc<ProxyState>,
}

impl ProxyServer {
    pub fn new(
        config: ProxyConfig,
        credentials: SharedCredentials,
        transports: Transports,
        solver: SharedSolver,
    ) -> Self {
        let forwarder = Forwarder::new(transports.default, config.forwarder.clone());
        let arkose = ArkoseFlow::new(
            transports.challenge,
            credentials.clone(),
            solver,
            &config.forwarder.chatgpt_url,
        )
        .with_model_version(config.model_version);

        Self {
            state: Arc::new(ProxyState {
                forwarder,
                arkose,
                credentials,
            }),
            config,
        }
    }

    /// Build the axum router.
    pub fn router(&self) -> AxumRouter {
        let mut router = AxumRouter::new()
            .route("/health", get(handle_health).fallback(handle_forward))
            .route(
                "/arkose/token",
                post(handle_arkose_token).fallback(handle_forward),
            )
            .fallback(handle_forward)
            .with_state(self.state.clone())
            .layer(DefaultBodyLimit::disable())
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router
    }

    /// Run with graceful shutdown, returning the bound address.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Starting relay server");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, self.router())
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "Relay server stopped with error");
            }
        });
        Ok(local_addr)
    }
}

/// Caller authorization: `Authorization`, falling back to `X-Authorization`.
fn caller_authorization(headers: &HeaderMap) -> String {
    [header::AUTHORIZATION.as_str(), X_AUTHORIZATION]
        .into_iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn caller_email(identity: Option<&CallerIdentity>, headers: &HeaderMap) -> Option<String> {
    identity.map(|id| id.0.clone()).or_else(|| {
        headers
            .get(X_CALLER_EMAIL)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// Handle every route not claimed above.
async fn handle_forward(
    State(state): State<Arc<ProxyState>>,
    identity: Option<Extension<CallerIdentity>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let inbound = InboundRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        body,
        authorization: caller_authorization(&headers),
        caller: caller_email(identity.as_ref().map(|Extension(id)| id), &headers),
    };

    state.forwarder.forward(inbound).await
}

/// Handle POST /arkose/token
async fn handle_arkose_token(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let authorization = caller_authorization(&headers);
    let access_token = authorization
        .strip_prefix("Bearer")
        .unwrap_or(&authorization)
        .trim();

    let token = state.arkose.acquire_token(access_token).await?;
    Ok(Json(serde_json::json!({ "token": token })))
}

/// Handle GET /health
async fn handle_health(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chatrelay",
        "session": state.credentials.has_session()
    }))
}

/// Error type for proxy responses.
#[derive(Debug)]
pub struct ProxyError(RelayError);

impl From<RelayError> for ProxyError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(error_payload(&self.0.to_string()))).into_response()
    }
}
