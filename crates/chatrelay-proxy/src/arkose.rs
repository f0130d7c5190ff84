//! Arkose challenge token acquisition.
//!
//! A token is obtained in two steps: a chat-requirements handshake that
//! yields the session-specific `dx` parameter, then a call to the external
//! solver. Requirements are fetched fresh on every call since `dx` is
//! request-scoped. A failed handshake degrades to an empty `dx`; the solver
//! decides whether that is solvable.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, header};
use serde::{Deserialize, Serialize};

use crate::credentials::SharedCredentials;
use crate::error::{RelayError, Result};
use crate::forward::{BACKEND_API_PATH, normalize_authorization};
use crate::transport::{SharedTransport, UpstreamRequest};

/// Path of the chat-requirements handshake under the ChatGPT base.
pub const CHAT_REQUIREMENTS_PATH: &str = "/sentinel/chat-requirements";

/// Fixed handshake body.
pub const CHAT_REQUIREMENTS_BODY: &str = r#"{"conversation_mode_kind":"primary_assistant"}"#;

/// Model version passed to the solver. Challenge tokens are in practice only
/// demanded for version 4 chats.
pub const DEFAULT_MODEL_VERSION: u8 = 4;

/// Response of the chat-requirements handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatRequirements {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub arkose: ArkoseRequirement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArkoseRequirement {
    #[serde(default)]
    pub required: bool,
    /// Session parameter, present only when a token is required.
    #[serde(default)]
    pub dx: Option<String>,
}

/// Inputs handed to the challenge solver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolveParams {
    pub version: u8,
    pub puid: String,
    pub dx: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

/// External challenge-solving capability.
#[async_trait]
pub trait ChallengeSolver: Send + Sync + fmt::Debug {
    async fn solve(&self, params: &SolveParams) -> Result<String>;
}

/// Shared solver for use across async contexts.
pub type SharedSolver = Arc<dyn ChallengeSolver>;

/// Solver used when none is configured; always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSolver;

#[async_trait]
impl ChallengeSolver for DisabledSolver {
    async fn solve(&self, _params: &SolveParams) -> Result<String> {
        Err(RelayError::Challenge(
            "no challenge solver configured".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    token: String,
}

/// Solver backed by an HTTP solving service.
///
/// Posts [`SolveParams`] as JSON and expects `{"token": "..."}`.
#[derive(Debug, Clone)]
pub struct HttpChallengeSolver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpChallengeSolver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ChallengeSolver for HttpChallengeSolver {
    async fn solve(&self, params: &SolveParams) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(params)
            .send()
            .await
            .map_err(|e| RelayError::Network(format!("Solver request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RelayError::Challenge(format!(
                "solver returned {}: {}",
                status, error_text
            )));
        }

        let solved: SolverResponse = response.json().await.map_err(|e| {
            RelayError::Challenge(format!("Failed to parse solver response: {}", e))
        })?;

        if solved.token.is_empty() {
            return Err(RelayError::Challenge("solver returned an empty token".to_string()));
        }
        Ok(solved.token)
    }
}

/// Runs the requirements handshake and the solver.
#[derive(Debug, Clone)]
pub struct ArkoseFlow {
    transport: SharedTransport,
    credentials: SharedCredentials,
    solver: SharedSolver,
    requirements_url: String,
    model_version: u8,
}

impl ArkoseFlow {
    pub fn new(
        transport: SharedTransport,
        credentials: SharedCredentials,
        solver: SharedSolver,
        chatgpt_url: &str,
    ) -> Self {
        Self {
            transport,
            credentials,
            solver,
            requirements_url: format!(
                "{}{}{}",
                chatgpt_url.trim_end_matches('/'),
                BACKEND_API_PATH,
                CHAT_REQUIREMENTS_PATH
            ),
            model_version: DEFAULT_MODEL_VERSION,
        }
    }

    pub fn with_model_version(mut self, version: u8) -> Self {
        self.model_version = version;
        self
    }

    pub fn requirements_url(&self) -> &str {
        &self.requirements_url
    }

    /// Fetch chat requirements; any failure yields `None`.
    pub async fn fetch_requirements(&self, access_token: &str) -> Option<ChatRequirements> {
        match self.try_fetch_requirements(access_token).await {
            Ok(requirements) => Some(requirements),
            Err(e) => {
                tracing::warn!(error = %e, "Chat requirements unavailable, continuing without dx");
                None
            }
        }
    }

    async fn try_fetch_requirements(&self, access_token: &str) -> Result<ChatRequirements> {
        let mut request = UpstreamRequest::new(Method::POST, &self.requirements_url)
            .header(header::CONTENT_TYPE, "application/json")?
            .with_body(CHAT_REQUIREMENTS_BODY);

        if let Some(cookie) = self.credentials.session_cookie() {
            request = request.header(header::COOKIE, &cookie)?;
        }
        if !access_token.is_empty() {
            request = request.header(
                header::AUTHORIZATION,
                &normalize_authorization(access_token),
            )?;
        }

        // The body is decoded whatever the status; the status only matters
        // when decoding fails.
        let response = self.transport.send(request).await?;
        let status = response.status;
        let body = response.bytes().await?;

        match serde_json::from_slice(&body) {
            Ok(requirements) => Ok(requirements),
            Err(_) if !status.is_success() => Err(RelayError::Upstream {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Obtain a challenge token for the caller's access token.
    pub async fn acquire_token(&self, access_token: &str) -> Result<String> {
        let requirements = self.fetch_requirements(access_token).await;
        if let Some(requirements) = &requirements {
            tracing::debug!(required = requirements.arkose.required, "Chat requirements fetched");
        }

        let params = SolveParams {
            version: self.model_version,
            puid: self.credentials.session_token(),
            dx: requirements
                .and_then(|r| r.arkose.dx)
                .unwrap_or_default(),
            proxy: self.credentials.proxy_address().map(str::to_string),
        };

        self.solver.solve(&params).await
    }
}
