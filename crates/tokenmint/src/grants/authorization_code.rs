//! Authorization code grant, with optional PKCE.
//!
//! Fresh acquisition is the only grant with a human in the loop: the driver
//! runs the authorization window, and the window's trace is kept in front of
//! the token-endpoint trace in the merged debug info.

use crate::authorize::AuthorizationDriver;
use crate::config::OAuthRequestConfig;
use crate::endpoint::GrantRequest;
use crate::error::Result;
use crate::mint::TokenMint;
use crate::pkce::PkcePair;
use crate::store::StoreKey;
use crate::token::TokenBundle;

impl<D: AuthorizationDriver> TokenMint<D> {
    pub(crate) async fn fresh_authorization_code(
        &self,
        config: &OAuthRequestConfig,
        collection_uid: &str,
        key: &StoreKey,
    ) -> Result<(TokenBundle, crate::debug::DebugInfo)> {
        let pkce = config.pkce.then(PkcePair::generate);
        let grant = self
            .fetch_authorization_code(
                config,
                pkce.as_ref().map(|p| p.challenge.as_str()),
                collection_uid,
            )
            .await?;
        let request = GrantRequest::AuthorizationCode {
            config,
            code: &grant.code,
            code_verifier: pkce.as_ref().map(|p| p.verifier.as_str()),
        };
        self.exchange_and_store(config, &request, key, grant.debug)
            .await
    }
}
