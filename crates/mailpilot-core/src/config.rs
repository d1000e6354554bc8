//! Account configuration.
//!
//! An account is described by a JSON file holding the IMAP and SMTP servers,
//! how to authenticate against them and how to look for key backups.

use std::path::Path;

use chrono::{DateTime, Utc};
use mailpilot_oauth::provider::ProviderKind;
use mailpilot_oauth::{OAuthClient, Provider, Token};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::renewal::{OAuthRenewal, Renewal};
use crate::session::{Channel, Credential, CredentialProvider, Endpoint};

/// Subjects the backup search looks for.
pub const DEFAULT_BACKUP_SUBJECTS: [&str; 4] = [
    "Your FlowCrypt Backup",
    "Your CryptUp Backup",
    "All you need to know about CryptUP (contains a backup)",
    "CryptUP Account Backup",
];

/// Folders never searched for backups.
pub const DEFAULT_IGNORED_FOLDERS: [&str; 7] = [
    "[Gmail]",
    "[Gmail]/Spam",
    "[Gmail]/Trash",
    "Spam",
    "Junk",
    "Trash",
    "Deleted Items",
];

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Security {
    /// No encryption; always rejected.
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Tls => "SSL/TLS",
            Self::StartTls => "STARTTLS",
        }
    }
}

/// One server of the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
    /// Login name; the account email when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl ServerConfig {
    /// Default IMAP port for the security mode.
    #[must_use]
    pub const fn default_imap_port(security: Security) -> u16 {
        match security {
            Security::None | Security::StartTls => 143,
            Security::Tls => 993,
        }
    }

    /// Default SMTP port for the security mode.
    #[must_use]
    pub const fn default_smtp_port(security: Security) -> u16 {
        match security {
            Security::None => 25,
            Security::StartTls => 587,
            Security::Tls => 465,
        }
    }

    fn preset(host: &str, port: u16, security: Security) -> Self {
        Self {
            host: host.to_string(),
            port,
            security,
            username: None,
        }
    }
}

/// How the account authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// Plain password (or app password).
    Password {
        /// The password.
        password: String,
    },
    /// `OAuth2` bearer tokens.
    #[serde(rename = "oauth2")]
    OAuth2 {
        /// Token issuer.
        provider: ProviderKind,
        /// Registered client id.
        client_id: String,
        /// Client secret for confidential clients.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_secret: Option<String>,
        /// Current access token.
        access_token: String,
        /// Refresh token.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refresh_token: Option<String>,
        /// Access token expiry.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },
}

/// Backup search settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Subjects backup messages are sent with.
    pub subjects: Vec<String>,
    /// Folder paths never searched.
    pub ignored_folders: Vec<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            subjects: DEFAULT_BACKUP_SUBJECTS.iter().map(ToString::to_string).collect(),
            ignored_folders: DEFAULT_IGNORED_FOLDERS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Email account configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Display name for the account.
    #[serde(default)]
    pub name: String,
    /// Email address.
    pub email: String,
    /// IMAP configuration.
    pub imap: ServerConfig,
    /// SMTP configuration.
    pub smtp: ServerConfig,
    /// Authentication.
    pub auth: AuthConfig,
    /// Backup search settings.
    #[serde(default)]
    pub backup: BackupConfig,
}

impl AccountConfig {
    /// Create account with common defaults for well-known providers.
    #[must_use]
    pub fn with_email(email: &str, auth: AuthConfig) -> Self {
        let domain = email
            .split('@')
            .nth(1)
            .map(str::to_lowercase)
            .unwrap_or_default();

        let (name, imap, smtp) = match domain.as_str() {
            "gmail.com" | "googlemail.com" => (
                "Gmail",
                ServerConfig::preset("imap.gmail.com", 993, Security::Tls),
                ServerConfig::preset("smtp.gmail.com", 465, Security::Tls),
            ),
            "outlook.com" | "hotmail.com" | "live.com" => (
                "Outlook",
                ServerConfig::preset("outlook.office365.com", 993, Security::Tls),
                ServerConfig::preset("smtp.office365.com", 587, Security::StartTls),
            ),
            "yahoo.com" | "ymail.com" => (
                "Yahoo",
                ServerConfig::preset("imap.mail.yahoo.com", 993, Security::Tls),
                ServerConfig::preset("smtp.mail.yahoo.com", 465, Security::Tls),
            ),
            "icloud.com" | "me.com" | "mac.com" => (
                "iCloud",
                ServerConfig::preset("imap.mail.me.com", 993, Security::Tls),
                ServerConfig::preset("smtp.mail.me.com", 587, Security::StartTls),
            ),
            _ => (
                domain.as_str(),
                ServerConfig::preset(&format!("imap.{domain}"), 993, Security::Tls),
                ServerConfig::preset(&format!("smtp.{domain}"), 465, Security::Tls),
            ),
        };

        Self {
            name: name.to_string(),
            email: email.to_string(),
            imap,
            smtp,
            auth,
            backup: BackupConfig::default(),
        }
    }

    /// Parses and validates an account from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or the account fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let account: Self = serde_json::from_str(json)?;
        account.validate()?;
        Ok(account)
    }

    /// Loads and validates an account file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Checks that the account can be used.
    ///
    /// # Errors
    ///
    /// Returns an error for missing fields or a non-TLS security mode.
    pub fn validate(&self) -> Result<()> {
        if !self.email.contains('@') {
            return Err(Error::Config(format!("invalid email address: {}", self.email)));
        }
        for (label, server) in [("IMAP", &self.imap), ("SMTP", &self.smtp)] {
            if server.host.trim().is_empty() {
                return Err(Error::Config(format!("{label} host is empty")));
            }
            if server.port == 0 {
                return Err(Error::Config(format!("{label} port is 0")));
            }
        }
        self.endpoint(Channel::Retrieval).check_security(Channel::Retrieval)?;
        self.endpoint(Channel::Submission).check_security(Channel::Submission)
    }

    /// Current `OAuth2` token, for token-authenticated accounts.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match &self.auth {
            AuthConfig::Password { .. } => None,
            AuthConfig::OAuth2 {
                access_token,
                refresh_token,
                expires_at,
                ..
            } => {
                let mut token = Token::new(access_token.clone(), "Bearer");
                token.refresh_token.clone_from(refresh_token);
                token.expires_at = *expires_at;
                Some(token)
            }
        }
    }

    /// Builds the token renewal matching the authentication mode.
    ///
    /// # Errors
    ///
    /// Returns an error if a custom provider's token URL is invalid.
    pub fn renewal(&self) -> Result<Renewal> {
        match (&self.auth, self.token()) {
            (
                AuthConfig::OAuth2 {
                    provider,
                    client_id,
                    client_secret,
                    ..
                },
                Some(token),
            ) => {
                let provider = Provider::from_kind(provider)
                    .map_err(|e| Error::Config(format!("invalid OAuth provider: {e}")))?;
                let mut client = OAuthClient::new(client_id.clone(), provider);
                if let Some(secret) = client_secret {
                    client = client.with_client_secret(secret.clone());
                }
                Ok(Renewal::OAuth(OAuthRenewal::new(client, token)))
            }
            _ => Ok(Renewal::Unavailable),
        }
    }

    fn server(&self, channel: Channel) -> &ServerConfig {
        match channel {
            Channel::Retrieval => &self.imap,
            Channel::Submission => &self.smtp,
        }
    }
}

impl CredentialProvider for AccountConfig {
    fn endpoint(&self, channel: Channel) -> Endpoint {
        let server = self.server(channel);
        Endpoint {
            host: server.host.clone(),
            port: server.port,
            username: server.username.clone().unwrap_or_else(|| self.email.clone()),
            security: server.security,
        }
    }

    fn credential(&self) -> Credential {
        match &self.auth {
            AuthConfig::Password { password } => Credential::Password(password.clone()),
            AuthConfig::OAuth2 { access_token, .. } => Credential::OAuthToken(access_token.clone()),
        }
    }
}
