//! Browser-mediated authorization for the authorization code grant.
//!
//! The driver is a capability: the orchestrator hands it a fully-built
//! authorization URL plus the callback to watch for, and gets back the
//! authorization code and a trace of the window. Interactive surfaces are
//! side-effectful, so headless tests substitute a scripted driver.

use async_trait::async_trait;
use url::Url;

use crate::config::OAuthRequestConfig;
use crate::debug::DebugInfo;
use crate::error::{Error, Result};

/// Input to one authorization run.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// The RFC 6749 §4.1.1 authorization URL, query parameters included.
    pub authorization_url: Url,
    /// The redirect target to intercept.
    pub callback_url: Url,
    /// Scopes cookies and storage; same endpoint + collection reuse it.
    pub session_id: String,
}

/// A captured authorization code plus the window's trace.
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    pub code: String,
    pub debug: DebugInfo,
}

/// Drives a user through an authorization server and intercepts the redirect
/// back to the callback URL.
///
/// The driver never sees the client secret.
#[async_trait]
pub trait AuthorizationDriver: Send + Sync {
    /// Run the authorization window to completion.
    ///
    /// # Errors
    /// - [`Error::AuthorizationAborted`] when the surface closes before the
    ///   callback is reached.
    /// - [`Error::AuthorizationRejected`] when the callback carries an
    ///   `error` parameter.
    /// - [`Error::AuthorizationTimeout`] when the window outlives the
    ///   driver's deadline.
    async fn authorize(&self, request: AuthorizationRequest) -> Result<AuthorizationGrant>;
}

/// Build the authorization URL for `config`, appending the standard query
/// parameters (and the PKCE pair when a challenge is supplied).
pub(crate) fn build_authorization_url(
    config: &OAuthRequestConfig,
    code_challenge: Option<&str>,
) -> Result<Url> {
    let mut url = config
        .authorization_url
        .clone()
        .ok_or_else(|| Error::missing("authorization_code", "authorization_url"))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        query.append_pair("client_id", &config.client_id);
        if let Some(callback) = &config.callback_url {
            query.append_pair("redirect_uri", callback.as_str());
        }
        if let Some(scope) = &config.scope {
            query.append_pair("scope", scope);
        }
        if let Some(challenge) = code_challenge {
            query.append_pair("code_challenge", challenge);
            query.append_pair("code_challenge_method", "S256");
        }
        if let Some(state) = &config.state {
            query.append_pair("state", state);
        }
    }
    Ok(url)
}

/// Whether a navigation target is the callback: scheme, host, port and path
/// must match exactly; query and fragment are ignored.
pub(crate) fn callback_matches(candidate: &Url, callback: &Url) -> bool {
    candidate.scheme() == callback.scheme()
        && candidate.host_str() == callback.host_str()
        && candidate.port_or_known_default() == callback.port_or_known_default()
        && candidate.path() == callback.path()
}

/// Extract the authorization code from a navigation that reached the
/// callback.
pub(crate) fn code_from_callback(url: &Url) -> Result<String> {
    let find = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };
    if let Some(error) = find("error") {
        return Err(Error::AuthorizationRejected {
            error,
            description: find("error_description"),
        });
    }
    find("code").ok_or(Error::AuthorizationAborted)
}

/// What one observed navigation means for the authorization run.
#[derive(Debug)]
pub(crate) enum Navigation {
    /// Not the callback; keep waiting.
    Unrelated,
    Reached { url: Url, outcome: Result<String> },
}

/// Classify a request target (as seen by an intercepting surface) against
/// the callback URL.
pub(crate) fn classify_navigation(target: &str, callback: &Url) -> Navigation {
    let Ok(candidate) = callback.join(target) else {
        return Navigation::Unrelated;
    };
    if !callback_matches(&candidate, callback) {
        return Navigation::Unrelated;
    }
    let outcome = code_from_callback(&candidate);
    Navigation::Reached {
        url: candidate,
        outcome,
    }
}

#[cfg(feature = "loopback-driver")]
pub use loopback::LoopbackDriver;

#[cfg(feature = "loopback-driver")]
mod loopback {
    use std::net::ToSocketAddrs;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use url::Url;

    use super::{
        classify_navigation, AuthorizationDriver, AuthorizationGrant, AuthorizationRequest,
        Navigation,
    };
    use crate::debug::{DebugExchange, DebugInfo, ExchangeRequest, ExchangeResponse};
    use crate::error::{Error, Result};
    use crate::token::now_ms;

    const SUCCESS_PAGE: &str = "<html><body><h1>Authorization complete.</h1>\
        <p>You can close this window and return to the application.</p></body></html>";
    const FAILURE_PAGE: &str = "<html><body><h1>Authorization failed.</h1>\
        <p>Return to the application for details.</p></body></html>";

    /// Authorization driver for native callers: opens the system browser and
    /// intercepts the redirect on a loopback listener bound to the callback
    /// URL's host and port.
    ///
    /// System browsers share one cookie jar, so the `session_id` is advisory
    /// here; embedded-surface drivers use it to partition storage.
    #[derive(Debug, Clone)]
    pub struct LoopbackDriver {
        timeout: Duration,
    }

    impl LoopbackDriver {
        #[must_use]
        pub fn new(timeout: Duration) -> Self {
            Self { timeout }
        }
    }

    impl Default for LoopbackDriver {
        /// Three minutes for the user to finish logging in.
        fn default() -> Self {
            Self::new(Duration::from_secs(180))
        }
    }

    #[async_trait]
    impl AuthorizationDriver for LoopbackDriver {
        async fn authorize(&self, request: AuthorizationRequest) -> Result<AuthorizationGrant> {
            let callback = &request.callback_url;
            let host = callback
                .host_str()
                .ok_or_else(|| Error::Driver("callback URL has no host".to_string()))?;
            let port = callback.port_or_known_default().unwrap_or(80);
            let addr = (host, port)
                .to_socket_addrs()
                .map_err(|e| Error::Driver(format!("cannot resolve callback host: {e}")))?
                .next()
                .ok_or_else(|| Error::Driver("callback host resolved to nothing".to_string()))?;
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|e| Error::Driver(format!("cannot bind callback listener: {e}")))?;

            tracing::debug!(
                session_id = %request.session_id,
                "Opening system browser for authorization"
            );
            if let Err(e) = open::that(request.authorization_url.as_str()) {
                tracing::warn!(
                    "Failed to open the system browser ({e}); navigate to {} manually",
                    request.authorization_url
                );
            }

            let started = now_ms();
            let (code, reached) = tokio::time::timeout(
                self.timeout,
                wait_for_callback(&listener, callback),
            )
            .await
            .map_err(|_| Error::AuthorizationTimeout)??;

            let mut debug = DebugInfo::new();
            let window_request = ExchangeRequest::new(
                request.authorization_url.to_string(),
                "GET".to_string(),
                Vec::new(),
                String::new(),
            );
            debug.record(DebugExchange::started(window_request).complete(ExchangeResponse {
                url: reached.to_string(),
                status: "200".to_string(),
                status_text: "OK".to_string(),
                headers: Vec::new(),
                body: serde_json::Value::Null,
                raw: Vec::new(),
                timestamp: now_ms(),
                elapsed_ms: now_ms().saturating_sub(started),
                error: None,
            }));
            Ok(AuthorizationGrant { code, debug })
        }
    }

    /// Accept connections until one hits the callback path, then answer the
    /// browser and surface the outcome. Stray requests (favicons and the
    /// like) get a 404 and the wait continues.
    async fn wait_for_callback(listener: &TcpListener, callback: &Url) -> Result<(String, Url)> {
        loop {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| Error::Driver(format!("callback listener failed: {e}")))?;
            let mut request_line = String::new();
            BufReader::new(&mut stream)
                .read_line(&mut request_line)
                .await
                .map_err(|e| Error::Driver(format!("callback read failed: {e}")))?;
            let Some(target) = request_line.split_whitespace().nth(1) else {
                respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                continue;
            };
            match classify_navigation(target, callback) {
                Navigation::Unrelated => {
                    respond(&mut stream, "404 Not Found", FAILURE_PAGE).await;
                }
                Navigation::Reached { url, outcome } => {
                    match outcome {
                        Ok(code) => {
                            respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
                            return Ok((code, url));
                        }
                        Err(e) => {
                            respond(&mut stream, "200 OK", FAILURE_PAGE).await;
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            tracing::debug!("Failed to answer the browser: {e}");
        }
        let _ = stream.flush().await;
    }
}
