//! Browser-session isolation for the authorization driver.
//!
//! Each (collection, token endpoint) pair gets its own session identifier, so
//! returning to the same endpoint under the same collection reuses cookies and
//! login state while distinct endpoints or collections stay isolated.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

/// Table of allocated session identifiers.
///
/// Identifiers are derived from a digest of the pair rather than drawn at
/// random, so persisted browser state stays attached across process restarts.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<(String, String), String>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The session identifier for `(collection_uid, token_url)`, allocated on
    /// first access and reused afterwards.
    #[must_use]
    pub fn session_id(&self, collection_uid: &str, token_url: &str) -> String {
        let mut sessions = self.sessions.lock().expect("Non-poisoned lock");
        sessions
            .entry((collection_uid.to_string(), token_url.to_string()))
            .or_insert_with(|| derive_session_id(collection_uid, token_url))
            .clone()
    }
}

fn derive_session_id(collection_uid: &str, token_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(collection_uid.as_bytes());
    hasher.update([0]);
    hasher.update(token_url.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn same_pair_reuses_the_identifier() {
        let sessions = SessionManager::new();
        let a = sessions.session_id("col", "https://id.example.com/token");
        let b = sessions.session_id("col", "https://id.example.com/token");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_pairs_are_isolated() {
        let sessions = SessionManager::new();
        let a = sessions.session_id("col", "https://id.example.com/token");
        let b = sessions.session_id("col", "https://other.example.com/token");
        let c = sessions.session_id("col2", "https://id.example.com/token");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn identifiers_are_stable_across_instances() {
        let a = SessionManager::new().session_id("col", "https://id.example.com/token");
        let b = SessionManager::new().session_id("col", "https://id.example.com/token");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }
}
