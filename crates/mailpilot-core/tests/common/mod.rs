//! Scripted in-memory mail server for driving the catalog.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mailpilot_core::range::SequenceRange;
use mailpilot_core::{
    AttachmentPart, BackupConfig, Channel, Connector, Credential, CredentialProvider, Endpoint,
    Error, Folder, FolderStatus, MailSession, MessageSummary, OperationCatalog,
    RetrievalConnection, Result, SearchExpr, Security, StoreAction, SubmissionConnection,
    TokenRenewalService, TransferEncoding, Uid, UidSet,
};

/// Failure injected into the next protocol call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Auth,
    Dropped,
    Server,
}

impl Fault {
    fn into_error(self) -> Error {
        match self {
            Self::Auth => Error::Authentication("[AUTHENTICATIONFAILED] Invalid credentials".into()),
            Self::Dropped => Error::ConnectionDropped("broken pipe".into()),
            Self::Server => Error::Server("NO [NONEXISTENT] Unknown Mailbox".into()),
        }
    }
}

/// Server state shared by every connection the fake connector opens.
#[derive(Default)]
pub struct Server {
    pub folders: Mutex<Vec<Folder>>,
    pub messages: Mutex<HashMap<String, Vec<MessageSummary>>>,
    pub parts: Mutex<HashMap<(Uid, String), Vec<u8>>>,
    pub raw: Mutex<HashMap<Uid, Vec<u8>>>,
    pub search_hits: Mutex<HashMap<String, UidSet>>,
    pub faults: Mutex<VecDeque<Fault>>,
    pub calls: AtomicUsize,
    pub connects: AtomicUsize,
    pub logouts: AtomicUsize,
    pub credentials: Mutex<Vec<Credential>>,
    pub searches: Mutex<Vec<(String, String)>>,
    pub ranges: Mutex<Vec<SequenceRange>>,
    pub stores: Mutex<Vec<(String, String, String)>>,
    pub moves: Mutex<Vec<(String, String, String)>>,
    pub expunges: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<Vec<u8>>>,
}

impl Server {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_folder(&self, path: &str, attributes: &[&str]) {
        self.folders.lock().unwrap().push(Folder::from_list(
            path,
            Some("/".to_string()),
            attributes.iter().map(ToString::to_string).collect(),
        ));
    }

    pub fn add_message(&self, folder: &str, message: MessageSummary) {
        self.messages
            .lock()
            .unwrap()
            .entry(folder.to_string())
            .or_default()
            .push(message);
    }

    pub fn add_part(&self, uid: Uid, part_id: &str, bytes: &[u8]) {
        self.parts
            .lock()
            .unwrap()
            .insert((uid, part_id.to_string()), bytes.to_vec());
    }

    pub fn set_search_hits(&self, folder: &str, uids: &[Uid]) {
        self.search_hits
            .lock()
            .unwrap()
            .insert(folder.to_string(), uids.iter().copied().collect());
    }

    pub fn fail_next(&self, faults: &[Fault]) {
        self.faults.lock().unwrap().extend(faults.iter().copied());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn call(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.faults.lock().unwrap().pop_front() {
            Some(fault) => Err(fault.into_error()),
            None => Ok(()),
        }
    }

    fn folder_messages(&self, folder: &str) -> Vec<MessageSummary> {
        self.messages
            .lock()
            .unwrap()
            .get(folder)
            .cloned()
            .unwrap_or_default()
    }
}

pub struct FakeRetrieval {
    server: Arc<Server>,
}

impl RetrievalConnection for FakeRetrieval {
    async fn list_folders(&mut self) -> Result<Vec<Folder>> {
        self.server.call()?;
        Ok(self.server.folders.lock().unwrap().clone())
    }

    async fn folder_status(&mut self, folder: &str) -> Result<FolderStatus> {
        self.server.call()?;
        let total = u32::try_from(self.server.folder_messages(folder).len()).unwrap();
        Ok(FolderStatus {
            total,
            ..FolderStatus::default()
        })
    }

    async fn fetch_by_sequence(
        &mut self,
        folder: &str,
        range: SequenceRange,
    ) -> Result<Vec<MessageSummary>> {
        self.server.call()?;
        self.server.ranges.lock().unwrap().push(range);
        Ok(self
            .server
            .folder_messages(folder)
            .into_iter()
            .filter(|message| (range.first..=range.last).contains(&message.sequence))
            .collect())
    }

    async fn fetch_by_uid(&mut self, folder: &str, uids: &UidSet) -> Result<Vec<MessageSummary>> {
        self.server.call()?;
        let wanted: Vec<Uid> = uids.iter().collect();
        Ok(self
            .server
            .folder_messages(folder)
            .into_iter()
            .filter(|message| wanted.contains(&message.uid))
            .collect())
    }

    async fn search(&mut self, folder: &str, expr: &SearchExpr) -> Result<UidSet> {
        self.server.call()?;
        self.server
            .searches
            .lock()
            .unwrap()
            .push((folder.to_string(), expr.to_imap()));
        Ok(self
            .server
            .search_hits
            .lock()
            .unwrap()
            .get(folder)
            .cloned()
            .unwrap_or_default())
    }

    async fn store_flags(&mut self, folder: &str, uids: &UidSet, action: &StoreAction) -> Result<()> {
        self.server.call()?;
        self.server.stores.lock().unwrap().push((
            folder.to_string(),
            uids.to_string(),
            action.to_imap(),
        ));
        Ok(())
    }

    async fn move_messages(&mut self, folder: &str, uids: &UidSet, destination: &str) -> Result<()> {
        self.server.call()?;
        self.server.moves.lock().unwrap().push((
            folder.to_string(),
            uids.to_string(),
            destination.to_string(),
        ));
        Ok(())
    }

    async fn expunge(&mut self, folder: &str) -> Result<()> {
        self.server.call()?;
        self.server.expunges.lock().unwrap().push(folder.to_string());
        Ok(())
    }

    async fn fetch_part(&mut self, folder: &str, uid: Uid, part_id: &str) -> Result<Vec<u8>> {
        self.server.call()?;
        self.server
            .parts
            .lock()
            .unwrap()
            .get(&(uid, part_id.to_string()))
            .cloned()
            .ok_or_else(|| Error::MissingMessageInfo {
                folder: folder.to_string(),
                uid,
                item: "the requested body part",
            })
    }

    async fn fetch_raw_message(&mut self, folder: &str, uid: Uid) -> Result<Vec<u8>> {
        self.server.call()?;
        self.server
            .raw
            .lock()
            .unwrap()
            .get(&uid)
            .cloned()
            .ok_or_else(|| Error::MissingMessageInfo {
                folder: folder.to_string(),
                uid,
                item: "its body",
            })
    }

    async fn logout(&mut self) -> Result<()> {
        self.server.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeSubmission {
    server: Arc<Server>,
}

impl SubmissionConnection for FakeSubmission {
    async fn send(&self, mime: &[u8]) -> Result<()> {
        self.server.call()?;
        self.server.sent.lock().unwrap().push(mime.to_vec());
        Ok(())
    }
}

pub struct FakeConnector {
    server: Arc<Server>,
}

impl Connector for FakeConnector {
    type Retrieval = FakeRetrieval;
    type Submission = FakeSubmission;

    async fn connect_retrieval(&self, session: &MailSession) -> Result<FakeRetrieval> {
        self.server.connects.fetch_add(1, Ordering::SeqCst);
        self.server
            .credentials
            .lock()
            .unwrap()
            .push(session.credential.clone());
        Ok(FakeRetrieval {
            server: Arc::clone(&self.server),
        })
    }

    async fn connect_submission(&self, _session: &MailSession) -> Result<FakeSubmission> {
        Ok(FakeSubmission {
            server: Arc::clone(&self.server),
        })
    }
}

/// Token renewal counting its calls.
pub struct FakeRenewal {
    pub calls: Arc<AtomicUsize>,
    pub fail: bool,
}

impl TokenRenewalService for FakeRenewal {
    async fn renew(&self) -> Result<Credential> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            Err(Error::TokenRenewal(mailpilot_oauth::Error::OAuth {
                error: "invalid_grant".to_string(),
                description: "Token has been expired or revoked.".to_string(),
            }))
        } else {
            Ok(Credential::OAuthToken(format!("token-{n}")))
        }
    }
}

pub struct TestAccount;

impl CredentialProvider for TestAccount {
    fn endpoint(&self, channel: Channel) -> Endpoint {
        let (host, port) = match channel {
            Channel::Retrieval => ("imap.example.com", 993),
            Channel::Submission => ("smtp.example.com", 465),
        };
        Endpoint {
            host: host.to_string(),
            port,
            username: "me@example.com".to_string(),
            security: Security::Tls,
        }
    }

    fn credential(&self) -> Credential {
        Credential::OAuthToken("token-0".to_string())
    }
}

pub type TestCatalog = OperationCatalog<FakeConnector, FakeRenewal>;

/// Catalog over `server` plus the renewal call counter.
pub fn catalog(server: &Arc<Server>, fail_renewal: bool) -> (TestCatalog, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let catalog = OperationCatalog::new(
        FakeConnector {
            server: Arc::clone(server),
        },
        TestAccount,
        FakeRenewal {
            calls: Arc::clone(&calls),
            fail: fail_renewal,
        },
        BackupConfig::default(),
    )
    .unwrap();
    (catalog, calls)
}

pub fn message(uid: Uid, sequence: u32, subject: &str) -> MessageSummary {
    MessageSummary {
        uid,
        sequence,
        subject: subject.to_string(),
        from: vec!["me@example.com".to_string()],
        to: vec!["me@example.com".to_string()],
        date: None,
        flags: Vec::new(),
        size: Some(1024),
        attachments: Vec::new(),
    }
}

pub fn attachment(part_id: &str, encoding: TransferEncoding) -> AttachmentPart {
    AttachmentPart {
        part_id: part_id.to_string(),
        filename: Some(format!("backup-{part_id}.asc")),
        mime_type: "application/pgp-keys".to_string(),
        encoding,
        size: 64,
    }
}
