//! Obtaining a fresh credential after the server rejected the current one.

use std::future::Future;

use mailpilot_oauth::{OAuthClient, Token};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::Credential;
use crate::error::{Error, Result};

/// Produces a replacement credential.
pub trait TokenRenewalService: Send + Sync {
    /// Returns a new credential, or the reason none could be obtained.
    fn renew(&self) -> impl Future<Output = Result<Credential>> + Send;
}

/// Renews access tokens with the refresh-token grant.
pub struct OAuthRenewal {
    client: OAuthClient,
    token: Mutex<Token>,
}

impl OAuthRenewal {
    /// Creates a renewal service starting from `token`.
    #[must_use]
    pub fn new(client: OAuthClient, token: Token) -> Self {
        Self {
            client,
            token: Mutex::new(token),
        }
    }

    /// Latest token, e.g. for persisting after a renewal.
    pub async fn current_token(&self) -> Token {
        self.token.lock().await.clone()
    }
}

impl TokenRenewalService for OAuthRenewal {
    async fn renew(&self) -> Result<Credential> {
        let mut token = self.token.lock().await;
        match self.client.refresh_token(&token).await {
            Ok(fresh) => {
                info!(
                    provider = %self.client.provider().name,
                    expires_at = ?fresh.expires_at,
                    "Access token renewed"
                );
                let credential = Credential::OAuthToken(fresh.access_token.clone());
                *token = fresh;
                Ok(credential)
            }
            Err(e) => {
                if e.is_revoked_grant() {
                    warn!("Refresh token was revoked; the account must sign in again");
                }
                Err(Error::TokenRenewal(e))
            }
        }
    }
}

/// Renewal chosen from the account's authentication mode.
pub enum Renewal {
    /// Token account.
    OAuth(OAuthRenewal),
    /// Password account; a rejected password cannot be renewed.
    Unavailable,
}

impl TokenRenewalService for Renewal {
    async fn renew(&self) -> Result<Credential> {
        match self {
            Self::OAuth(renewal) => renewal.renew().await,
            Self::Unavailable => Err(Error::Authentication(
                "password was rejected and cannot be renewed".to_string(),
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mailpilot_oauth::Provider;

    #[tokio::test]
    async fn test_unavailable_renewal_fails() {
        let result = Renewal::Unavailable.renew().await;
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn test_oauth_renewal_without_refresh_token_fails() {
        let client = OAuthClient::new("client", Provider::google().unwrap());
        let renewal = OAuthRenewal::new(client, Token::new("ya29.old", "Bearer"));

        let result = renewal.renew().await;
        assert!(matches!(
            result,
            Err(Error::TokenRenewal(mailpilot_oauth::Error::NoRefreshToken))
        ));
        assert_eq!(renewal.current_token().await.access_token, "ya29.old");
    }
}
