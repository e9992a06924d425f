//! The cache decision engine shared by every grant.
//!
//! All grants answer the same question — serve from the store, refresh, or
//! fetch fresh — before anything grant-specific happens. The decision is a
//! pure function so the full truth table stays testable without a server.

mod authorization_code;
mod client_credentials;
mod password;

use crate::authorize::AuthorizationDriver;
use crate::config::{GrantType, OAuthRequestConfig};
use crate::debug::DebugInfo;
use crate::endpoint::GrantRequest;
use crate::error::{Error, Result};
use crate::mint::{acquisition, TokenAcquisition, TokenMint};
use crate::refresh::refresh_credentials;
use crate::store::StoreKey;
use crate::token::{is_expired, TokenBundle};

/// What to do with the cached credential state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheDecision {
    /// The stored bundle is usable as-is.
    CacheHit,
    /// Expired, but a refresh token and `auto_refresh_token` are available.
    RefreshAttempt,
    /// Nothing usable; a fresh acquisition is allowed.
    FreshFetch,
    /// Expired and neither refresh nor fetch is allowed: hand it back as-is.
    ReturnExpired,
    /// Empty store and fetching is not allowed.
    ReturnNone,
}

/// The decision tree over the cached state and the caller's auto flags.
pub(crate) fn decide(
    stored_present: bool,
    expired: bool,
    has_refresh_token: bool,
    auto_refresh: bool,
    auto_fetch: bool,
) -> CacheDecision {
    if !stored_present {
        return if auto_fetch {
            CacheDecision::FreshFetch
        } else {
            CacheDecision::ReturnNone
        };
    }
    if !expired {
        return CacheDecision::CacheHit;
    }
    if auto_refresh && has_refresh_token {
        return CacheDecision::RefreshAttempt;
    }
    if auto_fetch {
        CacheDecision::FreshFetch
    } else {
        CacheDecision::ReturnExpired
    }
}

impl<D: AuthorizationDriver> TokenMint<D> {
    /// The orchestration every grant shares: consult the store (unless
    /// `force_fetch` bypasses it), attempt a refresh where the decision tree
    /// allows one, and otherwise run the grant's fresh acquisition.
    pub(crate) async fn acquire(
        &self,
        config: &OAuthRequestConfig,
        collection_uid: &str,
        force_fetch: bool,
        grant: GrantType,
    ) -> Result<TokenAcquisition> {
        config.validate(grant)?;
        let key = StoreKey::for_request(config, collection_uid);
        let mut debug = DebugInfo::new();

        if !force_fetch {
            let stored = self.store.get(&key);
            let has_refresh_token = stored
                .as_ref()
                .and_then(|b| b.refresh_token.as_deref())
                .map_or(false, |t| !t.is_empty());
            let decision = decide(
                stored.is_some(),
                is_expired(stored.as_ref()),
                has_refresh_token,
                config.auto_refresh_token,
                config.auto_fetch_token,
            );
            tracing::debug!(?decision, grant = grant.as_str(), "Resolved cached credential state");
            match decision {
                CacheDecision::CacheHit | CacheDecision::ReturnExpired => {
                    return Ok(acquisition(config, collection_uid, stored, debug));
                }
                CacheDecision::ReturnNone => {
                    return Ok(acquisition(config, collection_uid, None, debug));
                }
                CacheDecision::RefreshAttempt => {
                    let refreshed =
                        refresh_credentials(&self.endpoint, &self.store, config, collection_uid)
                            .await;
                    debug.extend(refreshed.debug);
                    if refreshed.credentials.is_some() {
                        return Ok(acquisition(
                            config,
                            collection_uid,
                            refreshed.credentials,
                            debug,
                        ));
                    }
                    if !config.auto_fetch_token {
                        // Refresh failed and fetching is off: the store is
                        // already cleared, hand back the expired bundle.
                        return Ok(acquisition(config, collection_uid, stored, debug));
                    }
                }
                CacheDecision::FreshFetch => {
                    if stored.is_some() {
                        self.store.clear(&key)?;
                    }
                }
            }
        }

        let fresh = match grant {
            GrantType::AuthorizationCode => {
                self.fresh_authorization_code(config, collection_uid, &key).await
            }
            GrantType::ClientCredentials => self.fresh_client_credentials(config, &key).await,
            GrantType::Password => self.fresh_password(config, &key).await,
        };
        match fresh {
            Ok((bundle, fetch_debug)) => {
                debug.extend(fetch_debug);
                Ok(acquisition(config, collection_uid, Some(bundle), debug))
            }
            Err(Error::TokenEndpoint {
                body,
                debug: fetch_debug,
            }) => {
                debug.extend(fetch_debug);
                Err(Error::TokenEndpoint { body, debug })
            }
            Err(e) => Err(e),
        }
    }

    /// Run one exchange against the access-token endpoint and persist the
    /// result. Rejects with the response body when the server refuses or the
    /// body carries no usable token; nothing is persisted on that path.
    pub(crate) async fn exchange_and_store(
        &self,
        config: &OAuthRequestConfig,
        request: &GrantRequest<'_>,
        key: &StoreKey,
        mut debug: DebugInfo,
    ) -> Result<(TokenBundle, DebugInfo)> {
        let result = self
            .endpoint
            .request_token(&config.access_token_url, request, &mut debug)
            .await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => return Err(with_debug(e, debug)),
        };
        if !outcome.status.is_success() {
            return Err(Error::TokenEndpoint {
                body: outcome.raw_body,
                debug,
            });
        }
        let Some(bundle) = outcome
            .bundle
            .filter(|b| b.has_access_token() && !b.has_error())
        else {
            return Err(Error::TokenEndpoint {
                body: outcome.raw_body,
                debug,
            });
        };
        let stored = match self.store.put(key, bundle.clone())? {
            Some(stored) => stored,
            None => bundle,
        };
        Ok((stored, debug))
    }
}

fn with_debug(e: Error, debug: DebugInfo) -> Error {
    match e {
        Error::TokenEndpoint { body, .. } => Error::TokenEndpoint { body, debug },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::CacheDecision::{CacheHit, FreshFetch, RefreshAttempt, ReturnExpired, ReturnNone};
    use super::*;

    #[test]
    fn empty_store_fetches_only_when_allowed() {
        assert_eq!(decide(false, true, false, true, true), FreshFetch);
        assert_eq!(decide(false, true, false, true, false), ReturnNone);
        assert_eq!(decide(false, true, false, false, false), ReturnNone);
    }

    #[test]
    fn live_bundle_always_wins() {
        for auto_refresh in [false, true] {
            for auto_fetch in [false, true] {
                for has_refresh in [false, true] {
                    assert_eq!(
                        decide(true, false, has_refresh, auto_refresh, auto_fetch),
                        CacheHit
                    );
                }
            }
        }
    }

    #[test]
    fn expired_with_refresh_token_refreshes_when_enabled() {
        assert_eq!(decide(true, true, true, true, true), RefreshAttempt);
        assert_eq!(decide(true, true, true, true, false), RefreshAttempt);
    }

    #[test]
    fn expired_without_refresh_token_falls_back_to_fetching() {
        assert_eq!(decide(true, true, false, true, true), FreshFetch);
        assert_eq!(decide(true, true, false, true, false), ReturnExpired);
    }

    #[test]
    fn expired_with_refresh_disabled_ignores_the_refresh_token() {
        assert_eq!(decide(true, true, true, false, true), FreshFetch);
        assert_eq!(decide(true, true, true, false, false), ReturnExpired);
    }
}
