//! Client credentials grant.

use crate::authorize::AuthorizationDriver;
use crate::config::OAuthRequestConfig;
use crate::debug::DebugInfo;
use crate::endpoint::GrantRequest;
use crate::error::Result;
use crate::mint::TokenMint;
use crate::store::StoreKey;
use crate::token::TokenBundle;

impl<D: AuthorizationDriver> TokenMint<D> {
    pub(crate) async fn fresh_client_credentials(
        &self,
        config: &OAuthRequestConfig,
        key: &StoreKey,
    ) -> Result<(TokenBundle, DebugInfo)> {
        let request = GrantRequest::ClientCredentials { config };
        self.exchange_and_store(config, &request, key, DebugInfo::new())
            .await
    }
}
