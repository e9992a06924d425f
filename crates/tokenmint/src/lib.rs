#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]

//! # OAuth2 Token Acquisition & Lifecycle
//!
//! This crate obtains, caches, refreshes and serves OAuth2 access tokens for
//! outbound API requests. Features include:
//!
//! * Authorization code grant with RFC 7636 PKCE, driven through a pluggable
//!   browser surface
//! * Client credentials and resource owner password grants
//! * A persistent credential store keyed by (collection, token endpoint,
//!   credentials id), written atomically and surviving restarts
//! * Refresh-on-expiry with a configurable fall-through to a fresh fetch
//! * A structured debug trace of every token-endpoint exchange, including
//!   transport failures, for UI inspection
//! * Safe defaults - does not follow redirects and hides secrets in Debug
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokenmint::{CredentialStore, GrantType, OAuthRequestConfig, TokenMint};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = OAuthRequestConfig::builder()
//!         .grant_type(GrantType::ClientCredentials)
//!         .access_token_url("https://identity.example.com/oauth2/token".parse().unwrap())
//!         .client_id("my-client-id")
//!         .client_secret("my-client-secret")
//!         .scope("my-scope")
//!         .build();
//!
//!     // One mint serves any number of collections and endpoints.
//!     let mint = TokenMint::builder()
//!         .set_store(Arc::new(CredentialStore::open_default().unwrap()))
//!         .build()
//!         .unwrap();
//!
//!     // Served from the store when fresh; fetched, refreshed or re-acquired
//!     // when not.
//!     let acquisition = mint
//!         .token_with_client_credentials(&config, "my-collection", false)
//!         .await
//!         .unwrap();
//!
//!     let credentials = acquisition.credentials.unwrap();
//!     let _header = credentials.authorization_header().unwrap();
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **all**: Includes `rustls-tls`, `loopback-driver`, and `runtime-tokio`.
//! - **default**: Same as `all`.
//! - **rustls-tls**: Enables `reqwest/rustls-tls` and `reqwest/rustls-tls-native-roots`.
//! - **loopback-driver**: Ships [`LoopbackDriver`], which opens the system
//!   browser and intercepts the redirect on a loopback listener.
//! - **runtime-tokio**: Enables the `tokio` runtime (currently the only
//!   supported async runtime), required by the loopback driver.
//!

mod authorize;
mod config;
mod debug;
mod endpoint;
pub mod error;
mod grants;
mod mint;
pub mod pkce;
mod refresh;
mod session;
mod store;
mod token;

#[cfg(feature = "loopback-driver")]
pub use authorize::LoopbackDriver;
pub use authorize::{AuthorizationDriver, AuthorizationGrant, AuthorizationRequest};
pub use config::{CredentialsPlacement, GrantType, OAuthRequestConfig};
pub use debug::{DebugExchange, DebugInfo, ExchangeRequest, ExchangeResponse};
pub use error::{Error, Result};
pub use mint::{TokenAcquisition, TokenMint, TokenMintBuilder};
pub use pkce::PkcePair;
pub use session::SessionManager;
pub use store::{CredentialStore, StoreKey};
pub use token::{is_expired, TokenBundle};
