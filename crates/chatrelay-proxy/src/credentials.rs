//! Shared session credential state.
//!
//! The store holds the current PUID and the outbound proxy address. The PUID
//! has a single writer (the refresh loop) and many readers; readers see either
//! the previous or the new value, never a torn one.

use std::sync::Arc;

use parking_lot::RwLock;

/// Cookie the upstream expects the session credential under.
pub const SESSION_COOKIE: &str = "_puid";

/// Process-lifetime credential state.
#[derive(Debug, Default)]
pub struct CredentialStore {
    session_token: RwLock<String>,
    proxy_address: Option<String>,
}

/// Shared handle to the credential store.
pub type SharedCredentials = Arc<CredentialStore>;

impl CredentialStore {
    /// Create an empty store. Empty proxy addresses are treated as unset.
    pub fn new(proxy_address: Option<String>) -> Self {
        Self {
            session_token: RwLock::new(String::new()),
            proxy_address: proxy_address.filter(|p| !p.trim().is_empty()),
        }
    }

    /// Create a shared store.
    pub fn shared(proxy_address: Option<String>) -> SharedCredentials {
        Arc::new(Self::new(proxy_address))
    }

    /// Current session credential; empty when no session has been established.
    pub fn session_token(&self) -> String {
        self.session_token.read().clone()
    }

    pub fn has_session(&self) -> bool {
        !self.session_token.read().is_empty()
    }

    /// Outbound proxy address, if configured.
    pub fn proxy_address(&self) -> Option<&str> {
        self.proxy_address.as_deref()
    }

    /// `Cookie` header value carrying the session credential, if one is set.
    pub fn session_cookie(&self) -> Option<String> {
        let token = self.session_token.read();
        if token.is_empty() {
            None
        } else {
            Some(format!("{}={};", SESSION_COOKIE, token))
        }
    }

    /// Replace the session credential. Only the refresh loop writes here.
    pub(crate) fn replace_session_token(&self, token: String) {
        *self.session_token.write() = token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_has_no_session() {
        let store = CredentialStore::new(None);
        assert!(!store.has_session());
        assert_eq!(store.session_token(), "");
        assert!(store.session_cookie().is_none());
    }

    #[test]
    fn test_empty_proxy_is_unset() {
        assert!(CredentialStore::new(Some("  ".to_string())).proxy_address().is_none());
        assert_eq!(
            CredentialStore::new(Some("socks5://127.0.0.1:1080".to_string())).proxy_address(),
            Some("socks5://127.0.0.1:1080")
        );
    }

    #[test]
    fn test_replace_session_token() {
        let store = CredentialStore::shared(None);
        store.replace_session_token("P1".to_string());
        assert!(store.has_session());
        assert_eq!(store.session_token(), "P1");
        assert_eq!(store.session_cookie().as_deref(), Some("_puid=P1;"));
    }
}
