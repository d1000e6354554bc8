//! SASL initial responses for token-based mail authentication.
//!
//! - XOAUTH2 (Google/Microsoft) is what IMAP and SMTP servers accept today
//! - OAUTHBEARER (RFC 7628) is the standardized successor

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Builds the unencoded XOAUTH2 payload.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
///
/// IMAP clients that base64-encode the authenticator output themselves need
/// this raw form.
#[must_use]
pub fn xoauth2_payload(user: &str, token: &str) -> String {
    format!("user={user}\x01auth=Bearer {token}\x01\x01")
}

/// Builds the base64-encoded XOAUTH2 initial response.
///
/// ```
/// use mailpilot_oauth::sasl::xoauth2_response;
///
/// let response = xoauth2_response("user@example.com", "ya29.a0...");
/// assert!(!response.contains("user@example.com"));
/// ```
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    STANDARD.encode(xoauth2_payload(user, token).as_bytes())
}

/// Builds the base64-encoded OAUTHBEARER initial response (RFC 7628).
///
/// Format: `n,a=<user>,\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn oauthbearer_response(user: &str, token: &str) -> String {
    let auth_string = format!("n,a={user},\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Challenge sent by a server when a bearer token is rejected.
///
/// Servers answer a failed XOAUTH2 exchange with a base64 JSON challenge such
/// as `{"status":"401","schemes":"bearer","scope":"..."}`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BearerChallenge {
    /// HTTP-style status code.
    pub status: String,
    /// Accepted schemes.
    #[serde(default)]
    pub schemes: String,
    /// Scope the token must carry.
    #[serde(default)]
    pub scope: Option<String>,
}

impl BearerChallenge {
    /// Decodes a base64 challenge from the server.
    ///
    /// Returns `None` when the text is not a JSON bearer challenge.
    #[must_use]
    pub fn decode(challenge: &str) -> Option<Self> {
        let bytes = STANDARD.decode(challenge.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Returns true when the challenge reports an unusable token.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == "400" || self.status == "401"
    }
}
