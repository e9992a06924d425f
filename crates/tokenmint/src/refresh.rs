//! The refresh engine: trade a stored refresh token for a new bundle.
//!
//! Failures here are terminal for the stored credentials but never for the
//! caller: the store is cleared and the orchestrator decides whether to fall
//! through to a fresh acquisition or hand back the expired bundle.

use crate::config::OAuthRequestConfig;
use crate::debug::DebugInfo;
use crate::endpoint::{GrantRequest, TokenEndpointClient};
use crate::store::{CredentialStore, StoreKey};
use crate::token::{now_ms, TokenBundle};

pub(crate) struct RefreshOutcome {
    pub(crate) credentials: Option<TokenBundle>,
    pub(crate) debug: DebugInfo,
}

/// Run one refresh-token exchange against `refresh_token_url` (falling back
/// to the access-token endpoint). Any failure clears the stored bundle.
#[tracing::instrument(skip_all, fields(collection_uid))]
pub(crate) async fn refresh_credentials(
    endpoint: &TokenEndpointClient,
    store: &CredentialStore,
    config: &OAuthRequestConfig,
    collection_uid: &str,
) -> RefreshOutcome {
    let key = StoreKey::for_request(config, collection_uid);
    let mut debug = DebugInfo::new();

    let refresh_token = store
        .get(&key)
        .and_then(|stored| stored.refresh_token)
        .filter(|token| !token.is_empty());
    let Some(refresh_token) = refresh_token else {
        tracing::debug!("No refresh token stored; clearing credentials");
        clear_quietly(store, &key);
        return RefreshOutcome {
            credentials: None,
            debug,
        };
    };

    let url = config.refresh_url().clone();
    let grant = GrantRequest::RefreshToken {
        config,
        refresh_token: &refresh_token,
    };
    let outcome = match endpoint.request_token(&url, &grant, &mut debug).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("Refresh exchange failed in transport: {e}");
            clear_quietly(store, &key);
            return RefreshOutcome {
                credentials: None,
                debug,
            };
        }
    };

    let bundle = outcome
        .bundle
        .filter(|b| b.has_access_token() && !b.has_error())
        .filter(|_| outcome.status.is_success());
    let Some(mut bundle) = bundle else {
        tracing::warn!(
            status = outcome.status.as_u16(),
            "Refresh rejected by the server; clearing credentials"
        );
        clear_quietly(store, &key);
        return RefreshOutcome {
            credentials: None,
            debug,
        };
    };

    // Servers are not required to rotate the refresh token; keep the old one
    // when the response omits it.
    if bundle.refresh_token.is_none() {
        bundle.refresh_token = Some(refresh_token);
    }

    // A persistence failure does not fail the refresh: outcomes here never
    // carry errors, and the exchanged bundle is still valid for this
    // invocation. A fresh acquisition in the same situation fails instead,
    // since its caller was promised a durable credential.
    let credentials = match store.put(&key, bundle.clone()) {
        Ok(Some(stored)) => Some(stored),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Refreshed token could not be persisted: {e}");
            bundle.created_at = Some(now_ms());
            Some(bundle)
        }
    };
    RefreshOutcome { credentials, debug }
}

fn clear_quietly(store: &CredentialStore, key: &StoreKey) {
    if let Err(e) = store.clear(key) {
        tracing::warn!("Failed to clear credentials after refresh failure: {e}");
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;
    use crate::config::GrantType;
    use crate::token::testing::timed_bundle;

    fn config(token_url: &str) -> OAuthRequestConfig {
        OAuthRequestConfig::builder()
            .grant_type(GrantType::ClientCredentials)
            .access_token_url(token_url.parse().unwrap())
            .client_id("u")
            .build()
    }

    fn expired_with_refresh(refresh_token: &str) -> TokenBundle {
        let mut bundle = timed_bundle("old", 60, now_ms() - 120_000);
        bundle.refresh_token = Some(refresh_token.to_string());
        bundle
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_refresh_token_clears_and_skips_the_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/token").expect(0).create_async().await;

        let config = config(&format!("{}/token", server.url()));
        let store = CredentialStore::in_memory();
        let key = StoreKey::for_request(&config, "col");
        store.seed(&key, timed_bundle("old", 60, now_ms() - 120_000));

        let endpoint = TokenEndpointClient::new(reqwest::Client::new());
        let outcome = refresh_credentials(&endpoint, &store, &config, "col").await;

        mock.assert_async().await;
        assert_eq!(outcome.credentials, None);
        assert!(outcome.debug.is_empty());
        assert_eq!(store.get(&key), None);
    }

    #[tokio::test]
    #[traced_test]
    async fn successful_refresh_replaces_the_stored_bundle() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::Exact(
                "grant_type=refresh_token&client_id=u&refresh_token=R".to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"access_token":"new","refresh_token":"R2","expires_in":3600}"#)
            .create_async()
            .await;

        let config = config(&format!("{}/token", server.url()));
        let store = CredentialStore::in_memory();
        let key = StoreKey::for_request(&config, "col");
        store.seed(&key, expired_with_refresh("R"));

        let endpoint = TokenEndpointClient::new(reqwest::Client::new());
        let outcome = refresh_credentials(&endpoint, &store, &config, "col").await;

        mock.assert_async().await;
        let credentials = outcome.credentials.unwrap();
        assert_eq!(credentials.access_token.as_deref(), Some("new"));
        assert_eq!(credentials.refresh_token.as_deref(), Some("R2"));
        assert!(credentials.created_at.is_some());

        let stored = store.get(&key).unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("new"));
        assert_eq!(stored.refresh_token.as_deref(), Some("R2"));
        assert_eq!(outcome.debug.len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn refresh_token_is_preserved_when_the_response_omits_it() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"new","expires_in":3600}"#)
            .create_async()
            .await;

        let config = config(&format!("{}/token", server.url()));
        let store = CredentialStore::in_memory();
        let key = StoreKey::for_request(&config, "col");
        store.seed(&key, expired_with_refresh("R"));

        let endpoint = TokenEndpointClient::new(reqwest::Client::new());
        let outcome = refresh_credentials(&endpoint, &store, &config, "col").await;

        assert_eq!(
            outcome.credentials.unwrap().refresh_token.as_deref(),
            Some("R")
        );
        assert_eq!(store.get(&key).unwrap().refresh_token.as_deref(), Some("R"));
    }

    #[tokio::test]
    #[traced_test]
    async fn error_response_clears_the_store_without_propagating() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let config = config(&format!("{}/token", server.url()));
        let store = CredentialStore::in_memory();
        let key = StoreKey::for_request(&config, "col");
        store.seed(&key, expired_with_refresh("R"));

        let endpoint = TokenEndpointClient::new(reqwest::Client::new());
        let outcome = refresh_credentials(&endpoint, &store, &config, "col").await;

        assert_eq!(outcome.credentials, None);
        assert_eq!(store.get(&key), None);
        assert_eq!(outcome.debug.len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn transport_failure_clears_the_store() {
        let config = config("http://127.0.0.1:1/token");
        let store = CredentialStore::in_memory();
        let key = StoreKey::for_request(&config, "col");
        store.seed(&key, expired_with_refresh("R"));

        let endpoint = TokenEndpointClient::new(reqwest::Client::new());
        let outcome = refresh_credentials(&endpoint, &store, &config, "col").await;

        assert_eq!(outcome.credentials, None);
        assert_eq!(store.get(&key), None);
        assert_eq!(outcome.debug.len(), 1);
        assert_eq!(outcome.debug.data[0].response.as_ref().unwrap().status, "-");
    }

    #[tokio::test]
    #[traced_test]
    async fn refreshed_bundle_is_served_even_when_persistence_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"new","refresh_token":"R2","expires_in":3600}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        let store = CredentialStore::open(store_dir.join("credentials.json")).unwrap();

        let config = config(&format!("{}/token", server.url()));
        let key = StoreKey::for_request(&config, "col");
        store.seed(&key, expired_with_refresh("R"));

        // Replace the store directory with a file so the flush cannot write.
        std::fs::remove_dir_all(&store_dir).unwrap();
        std::fs::write(&store_dir, b"").unwrap();

        let endpoint = TokenEndpointClient::new(reqwest::Client::new());
        let outcome = refresh_credentials(&endpoint, &store, &config, "col").await;

        // The exchange succeeded; the bundle is served despite the store.
        let credentials = outcome.credentials.unwrap();
        assert_eq!(credentials.access_token.as_deref(), Some("new"));
        assert_eq!(credentials.refresh_token.as_deref(), Some("R2"));
        assert!(credentials.created_at.is_some());
        assert_eq!(outcome.debug.len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn refresh_exchanges_go_to_the_refresh_url() {
        let mut server = mockito::Server::new_async().await;
        let refresh_mock = server
            .mock("POST", "/refresh")
            .with_status(200)
            .with_body(r#"{"access_token":"new"}"#)
            .create_async()
            .await;
        let token_mock = server.mock("POST", "/token").expect(0).create_async().await;

        let mut config = config(&format!("{}/token", server.url()));
        config.refresh_token_url = Some(format!("{}/refresh", server.url()).parse().unwrap());

        let store = CredentialStore::in_memory();
        // Keyed by the access-token endpoint even when refreshing elsewhere.
        let key = StoreKey::for_request(&config, "col");
        store.seed(&key, expired_with_refresh("R"));

        let endpoint = TokenEndpointClient::new(reqwest::Client::new());
        let outcome = refresh_credentials(&endpoint, &store, &config, "col").await;

        refresh_mock.assert_async().await;
        token_mock.assert_async().await;
        assert_eq!(
            outcome.credentials.unwrap().access_token.as_deref(),
            Some("new")
        );
    }
}
