//! Resource owner password credentials grant.

use crate::authorize::AuthorizationDriver;
use crate::config::OAuthRequestConfig;
use crate::debug::DebugInfo;
use crate::endpoint::GrantRequest;
use crate::error::Result;
use crate::mint::TokenMint;
use crate::store::StoreKey;
use crate::token::TokenBundle;

impl<D: AuthorizationDriver> TokenMint<D> {
    pub(crate) async fn fresh_password(
        &self,
        config: &OAuthRequestConfig,
        key: &StoreKey,
    ) -> Result<(TokenBundle, DebugInfo)> {
        let request = GrantRequest::Password { config };
        self.exchange_and_store(config, &request, key, DebugInfo::new())
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::authorize::testing::ScriptedDriver;
    use crate::config::{GrantType, OAuthRequestConfig};
    use crate::error::Error;
    use crate::store::{CredentialStore, StoreKey};
    use crate::TokenMint;

    fn mint() -> (TokenMint<ScriptedDriver>, Arc<CredentialStore>) {
        let store = Arc::new(CredentialStore::in_memory());
        let mint = TokenMint::with_driver(ScriptedDriver::returning_code("unused"))
            .set_store(store.clone())
            .build()
            .unwrap();
        (mint, store)
    }

    fn config(token_url: &str) -> OAuthRequestConfig {
        OAuthRequestConfig::builder()
            .grant_type(GrantType::Password)
            .access_token_url(token_url.parse().unwrap())
            .client_id("u")
            .client_secret("p")
            .username("alice")
            .password("pw")
            .build()
    }

    #[tokio::test]
    #[traced_test]
    async fn fetches_with_the_resource_owner_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::Exact(
                "grant_type=password&username=alice&password=pw&client_id=u&client_secret=p"
                    .to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"access_token":"T","refresh_token":"R","expires_in":3600}"#)
            .create_async()
            .await;

        let (mint, store) = mint();
        let config = config(&format!("{}/token", server.url()));

        let acquisition = mint
            .token_with_password(&config, "col", false)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            acquisition.credentials.unwrap().access_token.as_deref(),
            Some("T")
        );
        let stored = store.get(&StoreKey::for_request(&config, "col")).unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("R"));
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_resource_owner_password_is_a_configuration_error() {
        let (mint, _store) = mint();
        let mut config = config("https://id.example.com/token");
        config.password = None;

        let result = mint.token_with_password(&config, "col", false).await;
        assert!(matches!(
            result,
            Err(Error::Configuration {
                field: "password",
                ..
            })
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn cached_bundles_are_shared_with_the_decision_engine() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/token").expect(0).create_async().await;

        let (mint, store) = mint();
        let config = config(&format!("{}/token", server.url()));
        let key = StoreKey::for_request(&config, "col");
        let mut live = crate::token::testing::bundle("A");
        live.expires_in = Some(3600);
        store.put(&key, live).unwrap();

        let acquisition = mint
            .token_with_password(&config, "col", false)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            acquisition.credentials.unwrap().access_token.as_deref(),
            Some("A")
        );
    }
}
