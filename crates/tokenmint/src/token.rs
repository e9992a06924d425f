//! The token bundle returned by a token endpoint, and its freshness rules.

use std::time::{SystemTime, UNIX_EPOCH};

use http::HeaderValue;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// An access token plus the metadata the server sent alongside it.
///
/// Unknown response members are preserved verbatim in `extra`, so servers
/// that return non-standard fields round-trip through the store untouched.
#[derive(Clone, PartialEq, Serialize, Deserialize, veil::Redact)]
pub struct TokenBundle {
    #[redact]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[redact]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Lifetime in seconds, counted from `created_at`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_seconds"
    )]
    pub expires_in: Option<u64>,
    /// Milliseconds since the epoch, stamped by the store at receipt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl TokenBundle {
    /// Parse a token-endpoint response body that was already decoded to JSON.
    /// Returns `None` when the value is not an object.
    #[must_use]
    pub fn from_response_value(value: &Value) -> Option<Self> {
        value
            .as_object()
            .and_then(|_| serde_json::from_value(value.clone()).ok())
    }

    #[must_use]
    pub fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Whether the server reported an RFC 6749 §5.2 error member.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.extra.contains_key("error")
    }

    /// Absolute expiry in epoch milliseconds, when both inputs are known.
    #[must_use]
    pub fn expires_at_ms(&self) -> Option<u64> {
        Some(self.created_at? + self.expires_in?.saturating_mul(1000))
    }

    /// Expiry check against an explicit clock, for tests.
    ///
    /// A bundle without an access token is always expired. A bundle missing
    /// `expires_in` or `created_at` never expires by time.
    #[must_use]
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        if !self.has_access_token() {
            return true;
        }
        self.expires_at_ms().map_or(false, |at| now_ms > at)
    }

    /// Render `"{token_type} {access_token}"` as a sensitive header value,
    /// defaulting the scheme to `Bearer`.
    ///
    /// # Errors
    /// Fails with [`Error::InvalidHeaderValue`] if the rendered value is not
    /// ASCII, or if there is no access token to render.
    pub fn authorization_header(&self) -> Result<HeaderValue> {
        let token = self
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(Error::InvalidHeaderValue)?;
        let scheme = self
            .token_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or("Bearer");
        let mut header = HeaderValue::from_str(&format!("{scheme} {token}"))
            .map_err(|_| Error::InvalidHeaderValue)?;
        header.set_sensitive(true);
        Ok(header)
    }
}

/// Whether a stored bundle is unusable and a new token is needed.
#[must_use]
pub fn is_expired(bundle: Option<&TokenBundle>) -> bool {
    bundle.map_or(true, |b| b.is_expired_at(now_ms()))
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Accept `expires_in` as a JSON number or a numeric string. Some servers
/// send `"3600"`.
fn lenient_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::TokenBundle;

    pub(crate) fn bundle(access_token: &str) -> TokenBundle {
        TokenBundle {
            access_token: Some(access_token.to_string()),
            token_type: None,
            refresh_token: None,
            scope: None,
            expires_in: None,
            created_at: None,
            extra: serde_json::Map::new(),
        }
    }

    pub(crate) fn timed_bundle(access_token: &str, expires_in: u64, created_at: u64) -> TokenBundle {
        TokenBundle {
            expires_in: Some(expires_in),
            created_at: Some(created_at),
            ..bundle(access_token)
        }
    }
}
