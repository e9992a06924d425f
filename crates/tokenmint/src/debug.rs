//! Per-exchange capture of token-endpoint traffic, surfaced to callers so a
//! UI can show exactly what was sent and what came back.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;

use crate::token::now_ms;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// The request half of an exchange, captured at the moment it is sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    /// The form-encoded body as text.
    pub body: String,
    /// The exact bytes on the wire.
    pub raw: Vec<u8>,
    /// Epoch milliseconds at send time.
    pub timestamp: u64,
}

impl ExchangeRequest {
    #[must_use]
    pub fn new(url: String, method: String, headers: Vec<(String, String)>, body: String) -> Self {
        let raw = body.as_bytes().to_vec();
        Self {
            url,
            method,
            headers,
            body,
            raw,
            timestamp: now_ms(),
        }
    }
}

/// The response half of an exchange, or a synthetic stand-in when the
/// transport failed before any response arrived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeResponse {
    pub url: String,
    /// Numeric HTTP status rendered as text; `"-"` for transport failures.
    pub status: String,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    /// The body parsed as JSON, or the raw text as a JSON string when the
    /// body was not valid JSON.
    pub body: Value,
    pub raw: Vec<u8>,
    /// Epoch milliseconds at receipt.
    pub timestamp: u64,
    /// Wall-clock duration of the round-trip.
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExchangeResponse {
    /// A stand-in response for a request that never reached the server.
    #[must_use]
    pub fn synthetic(url: String, error: &reqwest::Error, elapsed_ms: u64) -> Self {
        let code = error_code(error);
        Self {
            url,
            status: "-".to_string(),
            status_text: code.to_string(),
            headers: vec![("error".to_string(), code.to_string())],
            body: Value::Null,
            raw: Vec::new(),
            timestamp: now_ms(),
            elapsed_ms,
            error: Some(error.to_string()),
        }
    }
}

/// One token-endpoint round-trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugExchange {
    pub request_id: u64,
    pub request: ExchangeRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ExchangeResponse>,
    pub from_cache: bool,
    pub completed: bool,
}

impl DebugExchange {
    #[must_use]
    pub fn started(request: ExchangeRequest) -> Self {
        Self {
            request_id: next_request_id(),
            request,
            response: None,
            from_cache: false,
            completed: false,
        }
    }

    #[must_use]
    pub fn complete(mut self, response: ExchangeResponse) -> Self {
        self.response = Some(response);
        self.completed = true;
        self
    }

    /// Close the exchange with a synthetic transport-failure response.
    #[must_use]
    pub fn fail(mut self, error: &reqwest::Error, elapsed_ms: u64) -> Self {
        let url = self.request.url.clone();
        self.response = Some(ExchangeResponse::synthetic(url, error, elapsed_ms));
        self.completed = false;
        self
    }
}

/// The ordered trace of exchanges produced during one acquisition.
///
/// For the authorization code grant, the authorization-window trace is
/// prepended to the token-endpoint trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DebugInfo {
    pub data: Vec<DebugExchange>,
}

impl DebugInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an exchange. Records are never dropped.
    pub fn record(&mut self, exchange: DebugExchange) {
        self.data.push(exchange);
    }

    /// Splice an earlier trace in front of this one.
    pub fn prepend(&mut self, mut earlier: Self) {
        earlier.data.append(&mut self.data);
        self.data = earlier.data;
    }

    /// Move every record of `other` onto the end of this trace.
    pub fn extend(&mut self, mut other: Self) {
        self.data.append(&mut other.data);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }
}

/// Short classification of a transport failure, in the shape HTTP tooling
/// conventionally reports (`ETIMEDOUT`, `ECONNREFUSED`, ...).
fn error_code(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "ETIMEDOUT"
    } else if error.is_connect() {
        "ECONNREFUSED"
    } else if error.is_body() || error.is_decode() {
        "EDECODE"
    } else {
        "EREQUEST"
    }
}
