//! Background PUID refresh.
//!
//! Logs in with the operator account, stores the resulting PUID, sleeps for
//! the refresh interval and repeats. Any failed login, or one that yields an
//! empty access token or PUID, ends the loop for good: a misconfigured
//! operator account does not fix itself.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{OperatorCredentials, SharedAuthenticator};
use crate::credentials::SharedCredentials;
use crate::error::{RelayError, Result};

/// Time between successful refreshes (7 days).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Observable state of the refresh loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Not started.
    Idle,
    Authenticating,
    /// Waiting out the refresh interval.
    Sleeping,
    /// Stopped after a failed refresh; never restarts.
    Terminated,
    /// Stopped by shutdown.
    Stopped,
}

/// Why the loop returned.
#[derive(Debug)]
pub enum RefreshExit {
    Cancelled,
    Failed(RelayError),
}

/// PUID refresh loop.
#[derive(Debug)]
pub struct RefreshLoop {
    authenticator: SharedAuthenticator,
    credentials: OperatorCredentials,
    store: SharedCredentials,
    interval: Duration,
    state: watch::Sender<RefreshState>,
}

impl RefreshLoop {
    pub fn new(
        authenticator: SharedAuthenticator,
        credentials: OperatorCredentials,
        store: SharedCredentials,
    ) -> Self {
        let (state, _) = watch::channel(RefreshState::Idle);
        Self {
            authenticator,
            credentials,
            store,
            interval: DEFAULT_REFRESH_INTERVAL,
            state,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.state.subscribe()
    }

    /// Log in once and return the new PUID without storing it.
    pub async fn refresh_once(&self) -> Result<String> {
        let session = self
            .authenticator
            .authenticate(&self.credentials, self.store.proxy_address())
            .await?;

        if session.access_token.is_empty() {
            return Err(RelayError::Authentication(
                "login returned an empty access token".to_string(),
            ));
        }
        if session.puid.is_empty() {
            return Err(RelayError::Authentication(
                "login returned an empty PUID".to_string(),
            ));
        }

        Ok(session.puid)
    }

    /// Run until cancelled or until a refresh fails.
    pub async fn run(self, cancel: CancellationToken) -> RefreshExit {
        loop {
            self.state.send_replace(RefreshState::Authenticating);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.refresh_once() => Some(result),
            };

            match outcome {
                None => {
                    self.state.send_replace(RefreshState::Stopped);
                    return RefreshExit::Cancelled;
                }
                Some(Ok(puid)) => {
                    self.store.replace_session_token(puid);
                    tracing::info!(
                        username = %self.credentials.username(),
                        next_in_secs = self.interval.as_secs(),
                        "PUID refreshed"
                    );
                }
                Some(Err(e)) => {
                    tracing::error!(
                        username = %self.credentials.username(),
                        error = %e,
                        "Failed to refresh PUID, refresh loop stopped"
                    );
                    self.state.send_replace(RefreshState::Terminated);
                    return RefreshExit::Failed(e);
                }
            }

            self.state.send_replace(RefreshState::Sleeping);

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.state.send_replace(RefreshState::Stopped);
                    return RefreshExit::Cancelled;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Spawn the loop on its own task.
    pub fn spawn(self, cancel: CancellationToken) -> RefreshHandle {
        let state = self.subscribe();
        let task = tokio::spawn(self.run(cancel.clone()));
        RefreshHandle {
            cancel,
            state,
            task,
        }
    }
}

/// Handle to a spawned refresh loop.
#[derive(Debug)]
pub struct RefreshHandle {
    cancel: CancellationToken,
    state: watch::Receiver<RefreshState>,
    task: JoinHandle<RefreshExit>,
}

impl RefreshHandle {
    pub fn state(&self) -> RefreshState {
        *self.state.borrow()
    }

    /// Cancel the loop and wait for it to finish.
    pub async fn shutdown(self) -> Option<RefreshExit> {
        self.cancel.cancel();
        self.task.await.ok()
    }
}

/// Start the refresh loop if operator credentials are configured.
pub fn start_refresh(
    authenticator: SharedAuthenticator,
    credentials: Option<OperatorCredentials>,
    store: SharedCredentials,
    interval: Duration,
    cancel: CancellationToken,
) -> Option<RefreshHandle> {
    let Some(credentials) = credentials else {
        tracing::info!("No operator credentials configured, PUID refresh disabled");
        return None;
    };

    Some(
        RefreshLoop::new(authenticator, credentials, store)
            .with_interval(interval)
            .spawn(cancel),
    )
}
