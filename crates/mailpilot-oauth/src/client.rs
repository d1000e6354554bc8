//! `OAuth2` client for the refresh grant.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};

/// `OAuth2` client bound to one provider and application registration.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: Option<String>,
    provider: Provider,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a new `OAuth2` client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            provider,
            http_client: reqwest::Client::new(),
        }
    }

    /// Sets the client secret (confidential clients only).
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Returns the provider this client talks to.
    #[must_use]
    pub const fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Exchanges the refresh token held by `token` for a new access token.
    ///
    /// The returned token keeps the old refresh token when the provider does
    /// not rotate it.
    ///
    /// # Errors
    ///
    /// Returns an error if `token` has no refresh token, the request fails,
    /// or the provider rejects the grant.
    pub async fn refresh_token(&self, token: &Token) -> Result<Token> {
        let refresh_token = token.refresh_token()?;

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", self.client_id.as_str());

        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret.as_str());
        }

        debug!(provider = %self.provider.name, "Refreshing access token");

        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error: ErrorResponse = response.json().await?;
            return Err(error.into_error());
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(Token::refreshed_from(token_response, token))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails_early() {
        let client = OAuthClient::new("client-id", Provider::google().unwrap());
        let token = Token::new("ya29.old", "Bearer");

        let result = client.refresh_token(&token).await;
        assert!(matches!(result, Err(Error::NoRefreshToken)));
    }

    #[test]
    fn test_client_secret_builder() {
        let client = OAuthClient::new("id", Provider::microsoft().unwrap()).with_client_secret("s3cret");
        assert_eq!(client.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(client.provider().name, "Microsoft");
    }
}
