use std::str::FromStr;

use tokenmint::{GrantType, OAuthRequestConfig, TokenMint};
use url::Url;

#[tokio::main]
async fn main() {
    let config = OAuthRequestConfig::builder()
        .grant_type(GrantType::AuthorizationCode)
        .access_token_url(Url::from_str("https://identity.example.com/oauth2/token").unwrap())
        .authorization_url(Url::from_str("https://identity.example.com/oauth2/authorize").unwrap())
        // The loopback driver binds this host and port to catch the redirect.
        .callback_url(Url::from_str("http://localhost:7878/callback").unwrap())
        .client_id("my-client-id")
        .scope("my-scope")
        .pkce(true)
        .build();

    // The default builder uses the system browser via the loopback driver.
    let mint = TokenMint::builder().build().unwrap();

    println!("Opening the browser; finish logging in there.");
    let acquisition = mint
        .token_with_authorization_code(&config, "my-collection", false)
        .await
        .unwrap();

    let credentials = acquisition.credentials.unwrap();
    println!(
        "got a token ({} exchange(s) recorded, refresh token: {})",
        acquisition.debug.len(),
        credentials.refresh_token.is_some()
    );
}
