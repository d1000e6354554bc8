//! # mailpilot-core
//!
//! Self-healing mail operations for a single account.
//!
//! This crate provides:
//! - Session management for the IMAP/SMTP connection pair
//! - Failure classification with one remediation per failure episode
//!   (token renewal or reconnect)
//! - Paging and search expression building
//! - The operation catalog, including the key backup search
//! - IMAP and SMTP transports over TLS
//!
//! ```no_run
//! use mailpilot_core::{AccountConfig, MailConnector, OperationCatalog};
//!
//! # async fn run() -> mailpilot_core::Result<()> {
//! let config = AccountConfig::load("account.json")?;
//! let renewal = config.renewal()?;
//! let backup = config.backup.clone();
//! let catalog = OperationCatalog::new(MailConnector, config, renewal, backup)?;
//!
//! for folder in catalog.fetch_folders().await? {
//!     println!("{}", folder.path);
//! }
//! catalog.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod catalog;
pub mod codec;
pub mod config;
pub mod crypto;
mod error;
pub mod model;
pub mod range;
pub mod retry;
pub mod search;
pub mod session;
pub mod transport;

pub use catalog::{CatalogHandle, OperationCatalog};
pub use config::{AccountConfig, AuthConfig, BackupConfig, Security, ServerConfig};
pub use crypto::{CryptoEngine, CryptoError, DecryptionKey};
pub use error::{BackupStage, ClassifiedError, Error, Result};
pub use model::{
    AttachmentPart, Flag, Folder, FolderStatus, FolderType, MessagePage, MessageSummary,
    StoreAction, TransferEncoding, Uid, UidSet,
};
pub use range::{IndexRange, SequenceRange, compute_range};
pub use retry::RetryCoordinator;
pub use search::{Predicate, SearchExpr, SearchField, SearchQuery, combine};
pub use session::renewal::{OAuthRenewal, Renewal, TokenRenewalService};
pub use session::{
    Channel, Credential, CredentialProvider, Endpoint, MailSession, SessionManager,
};
pub use transport::{Connector, MailConnector, RetrievalConnection, SubmissionConnection};
