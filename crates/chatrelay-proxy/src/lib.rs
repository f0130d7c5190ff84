//! Credential-aware reverse proxy for the ChatGPT web and platform APIs.
//!
//! Forwards caller requests to the matching upstream surface with a
//! normalized bearer authorization, keeps an operator session credential
//! (PUID) fresh in the background, and obtains Arkose challenge tokens on
//! demand.
//!
//! # Components
//!
//! - [`transport`] - outbound HTTP capability and the reqwest-backed client
//! - [`credentials`] - process-wide PUID and proxy address
//! - [`forward`] - path classification, URL rewrite and response relay
//! - [`auth`] - operator login seam
//! - [`refresh`] - background PUID refresh loop
//! - [`arkose`] - chat-requirements handshake and challenge solving
//! - [`proxy`] - axum server tying it together

pub mod arkose;
pub mod auth;
pub mod credentials;
pub mod error;
pub mod forward;
pub mod proxy;
pub mod refresh;
pub mod transport;

pub use arkose::{
    ArkoseFlow, ChallengeSolver, ChatRequirements, DisabledSolver, HttpChallengeSolver,
    SharedSolver, SolveParams,
};
pub use auth::{AuthSession, Authenticator, HttpAuthenticator, OperatorCredentials, SharedAuthenticator};
pub use credentials::{CredentialStore, SharedCredentials};
pub use error::{RelayError, Result};
pub use forward::{Forwarder, ForwarderConfig, InboundRequest, Surface};
pub use proxy::{CallerIdentity, ProxyConfig, ProxyServer, Transports};
pub use refresh::{RefreshExit, RefreshHandle, RefreshLoop, RefreshState, start_refresh};
pub use transport::{HttpTransport, SharedTransport, Transport, TransportConfig};
