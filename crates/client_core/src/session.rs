use std::sync::RwLock;

use tracing::info;

/// Bearer token shared by every request issued through an [`crate::ApiClient`].
#[derive(Debug, Default)]
pub struct SessionStore {
    token: RwLock<Option<String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::default();
        store.set_token(token);
        store
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        let token = (!token.trim().is_empty()).then_some(token);
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    /// Drops the token. Returns whether one was present.
    pub fn clear(&self) -> bool {
        let previous = self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if previous.is_some() {
            info!("session: token cleared");
        }
        previous.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tokens_do_not_authenticate() {
        let session = SessionStore::with_token("   ");
        assert!(!session.is_authenticated());
    }

    #[test]
    fn clear_reports_previous_token() {
        let session = SessionStore::with_token("abc");
        assert_eq!(session.token().as_deref(), Some("abc"));
        assert!(session.clear());
        assert!(!session.clear());
        assert!(session.token().is_none());
    }
}
