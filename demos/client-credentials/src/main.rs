use std::str::FromStr;

use tokenmint::{GrantType, OAuthRequestConfig, TokenMint};
use url::Url;

#[tokio::main]
async fn main() {
    let token_endpoint = Url::from_str("https://identity.example.com/oauth2/token").unwrap();

    let config = OAuthRequestConfig::builder()
        .grant_type(GrantType::ClientCredentials)
        .access_token_url(token_endpoint)
        .client_id("my-client-id")
        .client_secret("my-client-secret")
        .scope("my-scope")
        .build();

    // One mint serves any number of collections; bundles persist in the
    // platform data directory and survive restarts.
    let mint = TokenMint::builder().build().unwrap();

    // Served from the store when fresh, fetched otherwise.
    let acquisition = mint
        .token_with_client_credentials(&config, "my-collection", false)
        .await
        .unwrap();

    let credentials = acquisition.credentials.unwrap();
    println!(
        "access token expires at {:?}; {} exchange(s) recorded",
        credentials.expires_at_ms(),
        acquisition.debug.len()
    );

    // The bundle renders straight into an Authorization header.
    let _header = credentials.authorization_header().unwrap();
}
