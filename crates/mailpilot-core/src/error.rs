//! Error types for the mail engine.

use std::fmt;

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The connection went away underneath an operation.
    #[error("Connection dropped: {0}")]
    ConnectionDropped(String),

    /// The server answered NO or BAD.
    #[error("Server rejected command: {0}")]
    Server(String),

    /// The server sent something that could not be parsed.
    #[error("Malformed server response: {0}")]
    MalformedResponse(String),

    /// A fresh access token could not be obtained.
    #[error("Token renewal failed: {0}")]
    TokenRenewal(#[from] mailpilot_oauth::Error),

    /// The engine behind a handle no longer exists.
    #[error("Mail engine has been shut down")]
    LifecycleViolation,

    /// A stage of the backup search came back empty.
    #[error("backup search: stage `{0}` produced nothing")]
    Backup(BackupStage),

    /// A fetch response lacked an item that was asked for.
    #[error("Message {uid} in {folder} is missing {item}")]
    MissingMessageInfo {
        /// Folder the message lives in.
        folder: String,
        /// Message UID.
        uid: u32,
        /// What was missing.
        item: &'static str,
    },

    /// An outgoing message could not be turned into an envelope.
    #[error("Invalid outgoing message: {0}")]
    InvalidMessage(String),

    /// No trash folder is known for the account.
    #[error("No trash folder found")]
    NoTrashFolder,

    /// Security mode not supported.
    #[error("Security mode not supported: only SSL/TLS is supported")]
    UnsupportedSecurity,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The crypto engine refused to decrypt.
    #[error("Decryption failed: {0}")]
    Crypto(#[from] CryptoError),
}

impl Error {
    /// Sorts the error into one of the classes the retry logic acts on.
    #[must_use]
    pub fn classify(&self) -> ClassifiedError {
        match self {
            Self::Authentication(_) => ClassifiedError::Authentication,
            Self::ConnectionDropped(_) => ClassifiedError::ConnectionDropped,
            other => ClassifiedError::Other(other.to_string()),
        }
    }

    /// Builds a [`Error::ConnectionDropped`] from anything displayable.
    pub(crate) fn dropped(err: impl fmt::Display) -> Self {
        Self::ConnectionDropped(err.to_string())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failed protocol call.
///
/// Only the first two classes are ever remediated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedError {
    /// Credentials were rejected; a token renewal may help.
    Authentication,
    /// The transport went away; reconnecting may help.
    ConnectionDropped,
    /// Anything else, carrying the rendered error.
    Other(String),
}

impl ClassifiedError {
    /// Returns true for the classes that get one remediation attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Authentication | Self::ConnectionDropped)
    }
}

/// Stages of the backup search pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStage {
    /// Listing candidate folders.
    Folders,
    /// Searching each folder for matching UIDs.
    Uids,
    /// Fetching the matching messages.
    Messages,
    /// Enumerating attachment parts.
    Attachments,
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Folders => "folders",
            Self::Uids => "uids",
            Self::Messages => "messages",
            Self::Attachments => "attachments",
        };
        f.write_str(name)
    }
}

/// Returns true when a server response text reports rejected credentials.
pub(crate) fn looks_like_auth_failure(text: &str) -> bool {
    let upper = text.to_ascii_uppercase();
    ["AUTHENTICATIONFAILED", "INVALID CREDENTIALS", "AUTHENTICATE FAILED", "[AUTH]"]
        .iter()
        .any(|needle| upper.contains(needle))
}

/// Returns true when an error text describes a dead transport.
pub(crate) fn looks_like_dropped(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    [
        "broken pipe",
        "connection reset",
        "connection lost",
        "connection closed",
        "unexpected eof",
        "timed out",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}
