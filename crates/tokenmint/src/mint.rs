//! The caller surface: one service value, five operations.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::authorize::{
    build_authorization_url, AuthorizationDriver, AuthorizationGrant, AuthorizationRequest,
};
use crate::config::{GrantType, OAuthRequestConfig};
use crate::debug::DebugInfo;
use crate::endpoint::TokenEndpointClient;
use crate::error::{Error, Result};
use crate::refresh::refresh_credentials;
use crate::session::SessionManager;
use crate::store::CredentialStore;
use crate::token::TokenBundle;

/// What one acquisition produced, echoing the identity it was stored under.
///
/// `credentials` is `None` when the decision tree refused to fetch
/// (`auto_fetch_token` off with an empty store) or a refresh came back empty.
#[derive(Debug, Clone)]
pub struct TokenAcquisition {
    pub collection_uid: String,
    pub url: String,
    pub credentials: Option<TokenBundle>,
    pub credentials_id: String,
    pub debug: DebugInfo,
}

/// Acquires, caches, refreshes and serves OAuth2 tokens.
///
/// One value serves any number of collections and endpoints; the credential
/// store and the browser-session table are shared behind it. Cheap to share
/// by reference; the authorization driver is only exercised by the
/// authorization code grant.
pub struct TokenMint<D> {
    pub(crate) store: Arc<CredentialStore>,
    pub(crate) sessions: SessionManager,
    pub(crate) endpoint: TokenEndpointClient,
    pub(crate) driver: D,
}

impl<D> fmt::Debug for TokenMint<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenMint")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<D: AuthorizationDriver> TokenMint<D> {
    /// Start building a `TokenMint` around a specific authorization driver.
    #[must_use]
    pub fn with_driver(driver: D) -> TokenMintBuilder<D> {
        TokenMintBuilder {
            driver,
            store: None,
            http_client: None,
        }
    }

    /// Serve a token for the authorization code grant, driving the user
    /// through the authorization server when nothing usable is cached.
    ///
    /// # Errors
    /// - [`Error::Configuration`] when a required field is missing.
    /// - [`Error::AuthorizationAborted`] / [`Error::AuthorizationRejected`] /
    ///   [`Error::AuthorizationTimeout`] from the authorization window.
    /// - [`Error::TokenEndpoint`] when the code exchange fails.
    pub async fn token_with_authorization_code(
        &self,
        config: &OAuthRequestConfig,
        collection_uid: &str,
        force_fetch: bool,
    ) -> Result<TokenAcquisition> {
        self.acquire(config, collection_uid, force_fetch, GrantType::AuthorizationCode)
            .await
    }

    /// Serve a token for the client credentials grant.
    ///
    /// # Errors
    /// See [`TokenMint::token_with_authorization_code`]; no authorization
    /// window is involved.
    pub async fn token_with_client_credentials(
        &self,
        config: &OAuthRequestConfig,
        collection_uid: &str,
        force_fetch: bool,
    ) -> Result<TokenAcquisition> {
        self.acquire(config, collection_uid, force_fetch, GrantType::ClientCredentials)
            .await
    }

    /// Serve a token for the resource owner password grant.
    ///
    /// # Errors
    /// See [`TokenMint::token_with_authorization_code`]; no authorization
    /// window is involved.
    pub async fn token_with_password(
        &self,
        config: &OAuthRequestConfig,
        collection_uid: &str,
        force_fetch: bool,
    ) -> Result<TokenAcquisition> {
        self.acquire(config, collection_uid, force_fetch, GrantType::Password)
            .await
    }

    /// Force one refresh-token exchange, outside the cache decision tree.
    ///
    /// Refresh failures are absorbed: the stored bundle is cleared and the
    /// acquisition comes back with `credentials: None` and the trace intact.
    ///
    /// # Errors
    /// Only [`Error::Configuration`] when `client_id` is empty.
    pub async fn refresh_token(
        &self,
        config: &OAuthRequestConfig,
        collection_uid: &str,
    ) -> Result<TokenAcquisition> {
        if config.client_id.is_empty() {
            return Err(Error::missing("refresh_token", "client_id"));
        }
        let outcome = refresh_credentials(&self.endpoint, &self.store, config, collection_uid).await;
        Ok(acquisition(
            config,
            collection_uid,
            outcome.credentials,
            outcome.debug,
        ))
    }

    /// Run just the authorization window and hand back the code — the
    /// low-level escape hatch for callers that exchange it themselves.
    ///
    /// # Errors
    /// - [`Error::Configuration`] when a required field is missing.
    /// - The authorization window errors of [`AuthorizationDriver::authorize`].
    pub async fn fetch_authorization_code(
        &self,
        config: &OAuthRequestConfig,
        code_challenge: Option<&str>,
        collection_uid: &str,
    ) -> Result<AuthorizationGrant> {
        config.validate(GrantType::AuthorizationCode)?;
        let authorization_url = build_authorization_url(config, code_challenge)?;
        let callback_url = config
            .callback_url
            .clone()
            .ok_or_else(|| Error::missing("authorization_code", "callback_url"))?;
        let session_id = self
            .sessions
            .session_id(collection_uid, config.access_token_url.as_str());
        self.driver
            .authorize(AuthorizationRequest {
                authorization_url,
                callback_url,
                session_id,
            })
            .await
    }
}

#[cfg(feature = "loopback-driver")]
impl TokenMint<crate::authorize::LoopbackDriver> {
    /// Builder with the default loopback browser driver.
    #[must_use]
    pub fn builder() -> TokenMintBuilder<crate::authorize::LoopbackDriver> {
        Self::with_driver(crate::authorize::LoopbackDriver::default())
    }
}

pub(crate) fn acquisition(
    config: &OAuthRequestConfig,
    collection_uid: &str,
    credentials: Option<TokenBundle>,
    debug: DebugInfo,
) -> TokenAcquisition {
    TokenAcquisition {
        collection_uid: collection_uid.to_string(),
        url: config.access_token_url.to_string(),
        credentials,
        credentials_id: config.credentials_id.clone(),
        debug,
    }
}

/// Builder for [`TokenMint`].
///
/// Defaults: the persistent store at the platform data directory, and an
/// HTTP client with redirects disabled and a 30 second timeout.
#[derive(Debug)]
pub struct TokenMintBuilder<D> {
    driver: D,
    store: Option<Arc<CredentialStore>>,
    http_client: Option<reqwest::Client>,
}

impl<D: AuthorizationDriver> TokenMintBuilder<D> {
    /// Use a specific credential store — an in-memory one for tests, or a
    /// persistent store at a custom location.
    #[must_use]
    pub fn set_store(mut self, store: Arc<CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Optionally specify the `reqwest::Client` used for token-endpoint
    /// requests. When setting a custom client, please make sure to set the
    /// `redirect` policy to `Policy::none()` to prevent SSRF vulnerabilities.
    #[must_use]
    pub fn set_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build the [`TokenMint`].
    ///
    /// # Errors
    /// Fails with [`Error::Store`] when no store was injected and the default
    /// persistent store cannot be opened.
    ///
    /// # Panics
    /// Panics if [`Self::set_http_client`] was not called and
    /// `reqwest::Client` cannot be constructed (TLS backend initialisation).
    pub fn build(self) -> Result<TokenMint<D>> {
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(CredentialStore::open_default()?),
        };
        let http = self.http_client.unwrap_or_else(|| {
            reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create reqwest client")
        });
        Ok(TokenMint {
            store,
            sessions: SessionManager::new(),
            endpoint: TokenEndpointClient::new(http),
            driver: self.driver,
        })
    }
}
