//! The HTTP client for token-endpoint exchanges.
//!
//! Every exchange goes out as `application/x-www-form-urlencoded` and is
//! recorded, including transport failures that never produced a response.

use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use url::form_urlencoded;
use url::Url;

use crate::config::{CredentialsPlacement, OAuthRequestConfig};
use crate::debug::{DebugExchange, DebugInfo, ExchangeRequest, ExchangeResponse};
use crate::error::{Error, Result};
use crate::token::{now_ms, TokenBundle};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_ACCEPT: &str = "application/json";

/// One grant exchange, borrowed from the request configuration.
pub(crate) enum GrantRequest<'a> {
    AuthorizationCode {
        config: &'a OAuthRequestConfig,
        code: &'a str,
        code_verifier: Option<&'a str>,
    },
    ClientCredentials {
        config: &'a OAuthRequestConfig,
    },
    Password {
        config: &'a OAuthRequestConfig,
    },
    RefreshToken {
        config: &'a OAuthRequestConfig,
        refresh_token: &'a str,
    },
}

impl GrantRequest<'_> {
    pub(crate) fn grant_type(&self) -> &'static str {
        match self {
            GrantRequest::AuthorizationCode { .. } => "authorization_code",
            GrantRequest::ClientCredentials { .. } => "client_credentials",
            GrantRequest::Password { .. } => "password",
            GrantRequest::RefreshToken { .. } => "refresh_token",
        }
    }

    pub(crate) fn config(&self) -> &OAuthRequestConfig {
        match self {
            GrantRequest::AuthorizationCode { config, .. }
            | GrantRequest::ClientCredentials { config }
            | GrantRequest::Password { config }
            | GrantRequest::RefreshToken { config, .. } => config,
        }
    }

    /// The form pairs for this grant, in RFC 6749 §4 order. The client
    /// secret only travels in the body when placement is `Body`.
    fn form_pairs(&self) -> Vec<(&'static str, String)> {
        let config = self.config();
        let mut pairs = vec![("grant_type", self.grant_type().to_string())];
        match self {
            GrantRequest::AuthorizationCode {
                code,
                code_verifier,
                ..
            } => {
                pairs.push(("code", (*code).to_string()));
                if let Some(callback) = &config.callback_url {
                    pairs.push(("redirect_uri", callback.to_string()));
                }
                pairs.push(("client_id", config.client_id.clone()));
                push_body_secret(config, &mut pairs);
                if let Some(verifier) = code_verifier {
                    pairs.push(("code_verifier", (*verifier).to_string()));
                }
                push_scope(config, &mut pairs);
            }
            GrantRequest::ClientCredentials { .. } => {
                pairs.push(("client_id", config.client_id.clone()));
                push_body_secret(config, &mut pairs);
                push_scope(config, &mut pairs);
            }
            GrantRequest::Password { .. } => {
                pairs.push(("username", config.username.clone().unwrap_or_default()));
                pairs.push(("password", config.password.clone().unwrap_or_default()));
                pairs.push(("client_id", config.client_id.clone()));
                push_body_secret(config, &mut pairs);
                push_scope(config, &mut pairs);
            }
            GrantRequest::RefreshToken { refresh_token, .. } => {
                pairs.push(("client_id", config.client_id.clone()));
                pairs.push(("refresh_token", (*refresh_token).to_string()));
                push_body_secret(config, &mut pairs);
            }
        }
        pairs
    }
}

fn push_body_secret(config: &OAuthRequestConfig, pairs: &mut Vec<(&'static str, String)>) {
    if config.credentials_placement == CredentialsPlacement::Body {
        if let Some(secret) = &config.client_secret {
            pairs.push(("client_secret", secret.clone()));
        }
    }
}

fn push_scope(config: &OAuthRequestConfig, pairs: &mut Vec<(&'static str, String)>) {
    if let Some(scope) = &config.scope {
        pairs.push(("scope", scope.clone()));
    }
}

/// Result of a transport-successful exchange, whatever the HTTP status.
pub(crate) struct TokenOutcome {
    pub(crate) status: StatusCode,
    /// The response parsed as a token bundle, when the body was a JSON
    /// object.
    pub(crate) bundle: Option<TokenBundle>,
    /// The response body decoded as text, verbatim.
    pub(crate) raw_body: String,
}

/// POSTs grant requests and parses responses leniently: a body that is not
/// valid JSON is carried through as its raw string for debug visibility.
#[derive(Debug, Clone)]
pub(crate) struct TokenEndpointClient {
    http: reqwest::Client,
}

impl TokenEndpointClient {
    pub(crate) fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Send one grant exchange to `url`, recording it into `debug`.
    ///
    /// # Errors
    /// Fails with [`Error::TokenEndpoint`] only on transport failure; HTTP
    /// error statuses are returned as a [`TokenOutcome`] for the caller to
    /// judge.
    #[tracing::instrument(skip_all, fields(url = %url, grant = grant.grant_type()))]
    pub(crate) async fn request_token(
        &self,
        url: &Url,
        grant: &GrantRequest<'_>,
        debug: &mut DebugInfo,
    ) -> Result<TokenOutcome> {
        let config = grant.config();
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(grant.form_pairs())
            .finish();

        let mut captured_headers = vec![
            (CONTENT_TYPE.to_string(), FORM_CONTENT_TYPE.to_string()),
            (ACCEPT.to_string(), JSON_ACCEPT.to_string()),
        ];
        let mut request = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(ACCEPT, JSON_ACCEPT)
            .body(body.clone());
        if config.credentials_placement == CredentialsPlacement::BasicAuthHeader {
            let value = basic_auth_value(
                &config.client_id,
                config.client_secret.as_deref().unwrap_or(""),
            );
            captured_headers.push((AUTHORIZATION.to_string(), value.clone()));
            request = request.header(AUTHORIZATION, value);
        }

        let exchange = DebugExchange::started(ExchangeRequest::new(
            url.to_string(),
            "POST".to_string(),
            captured_headers,
            body,
        ));
        let started = Instant::now();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let elapsed = elapsed_ms(started);
                debug.record(exchange.fail(&e, elapsed));
                tracing::debug!("Token request failed in transport: {e}");
                return Err(Error::TokenEndpoint {
                    body: e.to_string(),
                    debug: DebugInfo::new(),
                });
            }
        };

        let status = response.status();
        let response_url = response.url().to_string();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                let elapsed = elapsed_ms(started);
                debug.record(exchange.fail(&e, elapsed));
                return Err(Error::TokenEndpoint {
                    body: e.to_string(),
                    debug: DebugInfo::new(),
                });
            }
        };

        let raw_body = String::from_utf8_lossy(&bytes).into_owned();
        let parsed: Value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(raw_body.clone()));
        let bundle = TokenBundle::from_response_value(&parsed);

        debug.record(exchange.complete(ExchangeResponse {
            url: response_url,
            status: status.as_u16().to_string(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: response_headers,
            body: parsed,
            raw: bytes.to_vec(),
            timestamp: now_ms(),
            elapsed_ms: elapsed_ms(started),
            error: None,
        }));
        tracing::debug!(status = status.as_u16(), "Token endpoint answered");

        Ok(TokenOutcome {
            status,
            bundle,
            raw_body,
        })
    }
}

fn basic_auth_value(client_id: &str, client_secret: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{client_id}:{client_secret}")))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
