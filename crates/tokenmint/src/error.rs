use std::sync::Arc;

use crate::debug::DebugInfo;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
    #[error("Missing `{field}` in the {grant} grant configuration.")]
    Configuration {
        grant: &'static str,
        field: &'static str,
    },
    #[error("Authorization window closed before the callback was reached.")]
    AuthorizationAborted,
    #[error("Authorization server rejected the request: {error}")]
    AuthorizationRejected {
        error: String,
        description: Option<String>,
    },
    #[error("Timed out waiting for the authorization callback.")]
    AuthorizationTimeout,
    /// The token endpoint answered with an error status, an unusable body,
    /// or never answered at all. Carries the trace of what was exchanged so
    /// callers can present a timeline.
    #[error("Token endpoint request failed: {body}")]
    TokenEndpoint { body: String, debug: DebugInfo },
    #[error("Authorization driver failed: {0}")]
    Driver(String),
    #[error("Token cannot be used as a header value. Must be ASCII.")]
    InvalidHeaderValue,
    #[error("Credential store I/O failed: {0}")]
    Store(#[from] Arc<std::io::Error>),
}

impl Error {
    pub(crate) fn missing(grant: &'static str, field: &'static str) -> Self {
        Self::Configuration { grant, field }
    }

    pub(crate) fn store(e: std::io::Error) -> Self {
        Self::Store(Arc::new(e))
    }
}
