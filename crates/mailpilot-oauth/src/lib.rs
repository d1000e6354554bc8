//! # mailpilot-oauth
//!
//! `OAuth2` support for the mailpilot engine.
//!
//! Signing in (authorization code / device flows) happens outside this crate;
//! what lives here is what a long-running mail session needs afterwards:
//!
//! - **Token model**: access/refresh token pair with expiry tracking
//! - **Token refresh**: the `refresh_token` grant against a provider's token endpoint
//! - **Provider configurations**: Gmail, Outlook, Yahoo, or any custom endpoint
//! - **SASL payloads**: XOAUTH2 and OAUTHBEARER initial responses
//!
//! ## Refreshing an expired token
//!
//! ```ignore
//! use mailpilot_oauth::{OAuthClient, Provider, Token};
//!
//! let client = OAuthClient::new("client-id", Provider::google()?);
//! let stale = Token::new("ya29.old", "Bearer").with_refresh_token("1//refresh");
//! let fresh = client.refresh_token(&stale).await?;
//! println!("new access token expires at {:?}", fresh.expires_at);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;
pub mod provider;
pub mod sasl;
pub mod token;

pub use client::OAuthClient;
pub use error::{Error, Result};
pub use provider::Provider;
pub use token::Token;
