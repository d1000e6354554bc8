//! Error types for `OAuth2` operations.

/// Result type alias for `OAuth2` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `OAuth2` error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `OAuth2` error from server.
    #[error("OAuth2 error: {error} - {description}")]
    OAuth {
        /// Error code (e.g., `invalid_grant`).
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// No refresh token available.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// Invalid token response.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl Error {
    /// Creates an OAuth error from error code and description.
    #[must_use]
    pub fn oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Returns true when the grant itself was rejected.
    ///
    /// `invalid_grant` means the refresh token was revoked or expired; asking
    /// again will not help until the user signs in again.
    #[must_use]
    pub fn is_revoked_grant(&self) -> bool {
        matches!(self, Self::OAuth { error, .. } if error == "invalid_grant")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revoked_grant_detection() {
        assert!(Error::oauth_error("invalid_grant", "Token has been expired or revoked.").is_revoked_grant());
        assert!(!Error::oauth_error("invalid_client", "Unauthorized").is_revoked_grant());
        assert!(!Error::NoRefreshToken.is_revoked_grant());
    }

    #[test]
    fn test_oauth_error_display() {
        let err = Error::oauth_error("invalid_grant", "Bad Request");
        assert_eq!(err.to_string(), "OAuth2 error: invalid_grant - Bad Request");
    }
}
