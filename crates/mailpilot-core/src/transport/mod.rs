//! Protocol seams.
//!
//! The engine talks to servers only through these traits. [`MailConnector`]
//! is the production implementation (IMAP over TLS plus SMTP); tests plug in
//! scripted connections.

pub mod imap;
pub mod smtp;

use std::future::Future;
use std::sync::Arc;

use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};
use crate::model::{Folder, FolderStatus, MessageSummary, StoreAction, Uid, UidSet};
use crate::range::SequenceRange;
use crate::search::SearchExpr;
use crate::session::MailSession;

/// A logged-in, stateful retrieval connection.
///
/// Every call names its folder; implementations select it as needed.
pub trait RetrievalConnection: Send {
    /// Lists every folder.
    fn list_folders(&mut self) -> impl Future<Output = Result<Vec<Folder>>> + Send;

    /// Current counters of a folder.
    fn folder_status(&mut self, folder: &str) -> impl Future<Output = Result<FolderStatus>> + Send;

    /// Summaries of the messages in a sequence range.
    fn fetch_by_sequence(
        &mut self,
        folder: &str,
        range: SequenceRange,
    ) -> impl Future<Output = Result<Vec<MessageSummary>>> + Send;

    /// Summaries of the messages with the given UIDs.
    fn fetch_by_uid(
        &mut self,
        folder: &str,
        uids: &UidSet,
    ) -> impl Future<Output = Result<Vec<MessageSummary>>> + Send;

    /// UIDs of the messages matching an expression.
    fn search(
        &mut self,
        folder: &str,
        expr: &SearchExpr,
    ) -> impl Future<Output = Result<UidSet>> + Send;

    /// Changes flags.
    fn store_flags(
        &mut self,
        folder: &str,
        uids: &UidSet,
        action: &StoreAction,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Moves messages to another folder.
    fn move_messages(
        &mut self,
        folder: &str,
        uids: &UidSet,
        destination: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Permanently removes messages flagged `\Deleted`.
    fn expunge(&mut self, folder: &str) -> impl Future<Output = Result<()>> + Send;

    /// Bytes of one body part, still transfer-encoded.
    fn fetch_part(
        &mut self,
        folder: &str,
        uid: Uid,
        part_id: &str,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Complete RFC 822 message.
    fn fetch_raw_message(
        &mut self,
        folder: &str,
        uid: Uid,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Ends the session politely.
    fn logout(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// A submission channel.
pub trait SubmissionConnection: Send + Sync {
    /// Sends a complete MIME message.
    fn send(&self, mime: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

/// Opens connections from session descriptors.
pub trait Connector: Send + Sync + 'static {
    /// Retrieval connection type.
    type Retrieval: RetrievalConnection + 'static;
    /// Submission connection type.
    type Submission: SubmissionConnection + 'static;

    /// Connects and logs in to the retrieval server.
    fn connect_retrieval(
        &self,
        session: &MailSession,
    ) -> impl Future<Output = Result<Self::Retrieval>> + Send;

    /// Prepares the submission transport.
    fn connect_submission(
        &self,
        session: &MailSession,
    ) -> impl Future<Output = Result<Self::Submission>> + Send;
}

/// IMAP plus SMTP over TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailConnector;

impl Connector for MailConnector {
    type Retrieval = imap::ImapConnection;
    type Submission = smtp::SmtpConnection;

    async fn connect_retrieval(&self, session: &MailSession) -> Result<Self::Retrieval> {
        imap::ImapConnection::connect(session).await
    }

    fn connect_submission(
        &self,
        session: &MailSession,
    ) -> impl Future<Output = Result<Self::Submission>> + Send {
        std::future::ready(smtp::SmtpConnection::connect(session))
    }
}

/// Creates a TLS connector trusting the webpki root certificates.
///
/// # Errors
///
/// Returns an error if the TLS configuration cannot be built.
pub fn create_tls_connector() -> Result<TlsConnector> {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Config(format!("TLS configuration: {e}")))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}
