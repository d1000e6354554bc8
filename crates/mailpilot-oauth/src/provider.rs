//! Token endpoints for well-known mail providers.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

/// Which provider issued the account's tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google / Gmail.
    Google,
    /// Microsoft / Outlook.
    Microsoft,
    /// Yahoo Mail.
    Yahoo,
    /// Any other provider, identified by its token endpoint.
    Custom {
        /// Token endpoint URL.
        token_url: String,
    },
}

/// `OAuth2` provider configuration.
///
/// Only the token endpoint is needed to keep a session alive.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "Google").
    pub name: String,
    /// Token endpoint URL.
    pub token_url: Url,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the token URL is invalid.
    pub fn new(name: impl Into<String>, token_url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            token_url: Url::parse(token_url.as_ref())?,
        })
    }

    /// Google token endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn google() -> Result<Self> {
        Self::new("Google", "https://oauth2.googleapis.com/token")
    }

    /// Microsoft identity platform token endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn microsoft() -> Result<Self> {
        Self::new(
            "Microsoft",
            "https://login.microsoftonline.com/common/oauth2/v2.0/token",
        )
    }

    /// Yahoo token endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn yahoo() -> Result<Self> {
        Self::new("Yahoo", "https://api.login.yahoo.com/oauth2/get_token")
    }

    /// Resolves a configured provider kind.
    ///
    /// # Errors
    ///
    /// Returns an error if a custom token URL is invalid.
    pub fn from_kind(kind: &ProviderKind) -> Result<Self> {
        match kind {
            ProviderKind::Google => Self::google(),
            ProviderKind::Microsoft => Self::microsoft(),
            ProviderKind::Yahoo => Self::yahoo(),
            ProviderKind::Custom { token_url } => Self::new("Custom", token_url),
        }
    }
}
