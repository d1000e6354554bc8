//! Seam to the message decryption engine.
//!
//! The engine itself lives outside this crate; the catalog only fetches the
//! ciphertext and hands it over together with the account's keys.

use std::future::Future;

use thiserror::Error;

/// Why an engine could not decrypt a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The input is not a message the engine understands.
    #[error("not an encrypted message: {0}")]
    Format(String),
    /// None of the supplied keys can open the message.
    #[error("message is not encrypted for any of the available keys")]
    KeyMismatch,
    /// A passphrase was supplied but did not unlock the key.
    #[error("wrong passphrase")]
    WrongPassphrase,
    /// The matching key is locked and no passphrase was supplied.
    #[error("passphrase required")]
    NeedPassphrase,
    /// Any other engine failure.
    #[error("{0}")]
    Other(String),
}

impl CryptoError {
    /// Returns true when asking the user for a passphrase could help.
    #[must_use]
    pub const fn needs_passphrase(&self) -> bool {
        matches!(self, Self::WrongPassphrase | Self::NeedPassphrase)
    }
}

/// A private key the engine may try.
#[derive(Clone)]
pub struct DecryptionKey {
    /// Armored private key.
    pub armored: String,
    /// Passphrase, when known.
    pub passphrase: Option<String>,
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("armored", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Decrypts message bytes.
pub trait CryptoEngine: Send + Sync {
    /// Returns the plaintext of `ciphertext` using one of `keys`.
    fn decrypt(
        &self,
        ciphertext: &[u8],
        keys: &[DecryptionKey],
    ) -> impl Future<Output = Result<Vec<u8>, CryptoError>> + Send;
}
