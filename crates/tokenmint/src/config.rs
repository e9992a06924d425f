use typed_builder::TypedBuilder;
use url::Url;

use crate::error::{Error, Result};

/// The OAuth2 grant used to obtain a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    Password,
}

impl GrantType {
    /// The RFC 6749 `grant_type` parameter value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::Password => "password",
        }
    }
}

/// Where the client credentials travel on the token request.
///
/// `BasicAuthHeader` sends `Authorization: Basic base64(client_id ":" client_secret)`
/// and omits `client_secret` from the form body. `Body` keeps the secret in the
/// form body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsPlacement {
    BasicAuthHeader,
    #[default]
    Body,
}

/// Configuration for one token acquisition.
///
/// The same struct serves all grants; which fields are required depends on the
/// grant, and is validated when the acquisition starts. Secrets are redacted
/// from `Debug` output.
///
/// ```
/// use tokenmint::{GrantType, OAuthRequestConfig};
///
/// let config = OAuthRequestConfig::builder()
///     .grant_type(GrantType::ClientCredentials)
///     .access_token_url("https://identity.example.com/oauth2/token".parse().unwrap())
///     .client_id("my-client")
///     .client_secret("my-secret")
///     .scope("read write")
///     .build();
/// ```
#[derive(Clone, veil::Redact, TypedBuilder)]
pub struct OAuthRequestConfig {
    pub grant_type: GrantType,
    pub access_token_url: Url,
    /// Endpoint for refresh-token exchanges. Falls back to `access_token_url`.
    #[builder(default, setter(strip_option))]
    pub refresh_token_url: Option<Url>,
    /// Authorization endpoint (authorization code grant only).
    #[builder(default, setter(strip_option))]
    pub authorization_url: Option<Url>,
    /// URL the authorization server redirects to (authorization code grant only).
    #[builder(default, setter(strip_option))]
    pub callback_url: Option<Url>,
    #[builder(setter(into))]
    pub client_id: String,
    #[redact]
    #[builder(default, setter(into, strip_option))]
    pub client_secret: Option<String>,
    /// Resource owner name (password grant only).
    #[builder(default, setter(into, strip_option))]
    pub username: Option<String>,
    #[redact]
    #[builder(default, setter(into, strip_option))]
    pub password: Option<String>,
    /// Space-delimited scopes, passed through verbatim.
    #[builder(default, setter(into, strip_option))]
    pub scope: Option<String>,
    /// Opaque `state` parameter (authorization code grant only).
    #[builder(default, setter(into, strip_option))]
    pub state: Option<String>,
    /// Enable RFC 7636 PKCE (authorization code grant only).
    #[builder(default)]
    pub pkce: bool,
    #[builder(default)]
    pub credentials_placement: CredentialsPlacement,
    /// Caller-chosen label so multiple token bundles can coexist for the same
    /// token endpoint.
    #[builder(default = String::from("credentials"), setter(into))]
    pub credentials_id: String,
    /// Attempt a refresh-token exchange when the stored token has expired.
    #[builder(default = true)]
    pub auto_refresh_token: bool,
    /// Fetch a fresh token when there is nothing usable in the store.
    #[builder(default = true)]
    pub auto_fetch_token: bool,
}

impl OAuthRequestConfig {
    /// The endpoint refresh exchanges are sent to.
    #[must_use]
    pub fn refresh_url(&self) -> &Url {
        self.refresh_token_url
            .as_ref()
            .unwrap_or(&self.access_token_url)
    }

    /// Verify that every field the grant needs is present.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] naming the first missing field.
    pub fn validate(&self, grant: GrantType) -> Result<()> {
        if self.grant_type != grant {
            return Err(Error::missing(grant.as_str(), "grant_type"));
        }
        if self.client_id.is_empty() {
            return Err(Error::missing(grant.as_str(), "client_id"));
        }
        match grant {
            GrantType::AuthorizationCode => {
                if self.authorization_url.is_none() {
                    return Err(Error::missing(grant.as_str(), "authorization_url"));
                }
                if self.callback_url.is_none() {
                    return Err(Error::missing(grant.as_str(), "callback_url"));
                }
            }
            GrantType::Password => {
                if self.username.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::missing(grant.as_str(), "username"));
                }
                if self.password.is_none() {
                    return Err(Error::missing(grant.as_str(), "password"));
                }
            }
            GrantType::ClientCredentials => {}
        }
        Ok(())
    }
}
