//! Mail operations for one account.
//!
//! Every operation builds its raw protocol call and runs it through the
//! [`RetryCoordinator`], passing the same call again as the retry. The
//! catalog is an explicit handle: clone it to share, [`OperationCatalog::downgrade`]
//! it to hold a reference that does not keep the engine alive.

mod backup;

use std::sync::{Arc, Weak};

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::codec::decode_transfer;
use crate::config::BackupConfig;
use crate::crypto::{CryptoEngine, DecryptionKey};
use crate::error::{ClassifiedError, Error, Result};
use crate::model::{
    AttachmentPart, Flag, Folder, FolderType, MessagePage, MessageSummary, StoreAction, Uid,
    UidSet,
};
use crate::range::compute_range;
use crate::retry::RetryCoordinator;
use crate::search::{SearchExpr, SearchQuery};
use crate::session::renewal::TokenRenewalService;
use crate::session::{CredentialProvider, SessionManager};
use crate::transport::{Connector, RetrievalConnection, SubmissionConnection};

pub use backup::candidate_folders;

struct Engine<C: Connector, R> {
    retry: RetryCoordinator<C, R>,
    backup: BackupConfig,
    trash: OnceCell<Option<String>>,
}

/// Handle to the mail engine of one account.
pub struct OperationCatalog<C: Connector, R> {
    inner: Arc<Engine<C, R>>,
}

impl<C: Connector, R> Clone for OperationCatalog<C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Weak handle to an [`OperationCatalog`].
pub struct CatalogHandle<C: Connector, R> {
    inner: Weak<Engine<C, R>>,
}

impl<C: Connector, R> Clone for CatalogHandle<C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<C: Connector, R> CatalogHandle<C, R> {
    /// Returns the catalog if it is still alive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LifecycleViolation`] once every catalog is dropped.
    pub fn upgrade(&self) -> Result<OperationCatalog<C, R>> {
        self.inner
            .upgrade()
            .map(|inner| OperationCatalog { inner })
            .ok_or(Error::LifecycleViolation)
    }
}

impl<C: Connector, R: TokenRenewalService> OperationCatalog<C, R> {
    /// Creates the engine. No connection is opened until the first operation.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint uses an unsupported security mode.
    pub fn new(
        connector: C,
        provider: impl CredentialProvider + 'static,
        renewal: R,
        backup: BackupConfig,
    ) -> Result<Self> {
        let sessions = Arc::new(SessionManager::new(connector, provider)?);
        Ok(Self {
            inner: Arc::new(Engine {
                retry: RetryCoordinator::new(sessions, renewal),
                backup,
                trash: OnceCell::new(),
            }),
        })
    }

    /// Weak handle that does not keep the engine alive.
    #[must_use]
    pub fn downgrade(&self) -> CatalogHandle<C, R> {
        CatalogHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Class of the last unresolved failure of an operation.
    #[must_use]
    pub fn last_error(&self, operation: &str) -> Option<ClassifiedError> {
        self.inner.retry.last_error(operation)
    }

    /// Lists every folder of the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder list cannot be fetched.
    pub async fn fetch_folders(&self) -> Result<Vec<Folder>> {
        self.run_retrieval("fetchFolders", async |conn: &mut C::Retrieval| {
            conn.list_folders().await
        })
        .await
    }

    /// Fetches one page of a folder, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be opened or fetched.
    pub async fn fetch_messages(
        &self,
        folder: &str,
        page_size: u32,
        offset: u32,
    ) -> Result<MessagePage> {
        let status = self
            .run_retrieval("folderInfo", async |conn: &mut C::Retrieval| {
                conn.folder_status(folder).await
            })
            .await?;

        let window = compute_range(page_size, status.total, offset);
        let Some(range) = window.to_sequence(status.total) else {
            debug!(folder, total = status.total, offset, "Nothing to fetch");
            return Ok(MessagePage {
                messages: Vec::new(),
                total: status.total,
            });
        };

        let mut messages = self
            .run_retrieval("fetchMsgsByNumber", async |conn: &mut C::Retrieval| {
                conn.fetch_by_sequence(folder, range).await
            })
            .await?;
        messages.sort_by(|a, b| b.sequence.cmp(&a.sequence));

        Ok(MessagePage {
            messages,
            total: status.total,
        })
    }

    /// Fetches the messages with the given UIDs, newest first.
    ///
    /// An empty set returns an empty list without talking to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails.
    pub async fn fetch_messages_by_uid(
        &self,
        folder: &str,
        uids: &UidSet,
    ) -> Result<Vec<MessageSummary>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let mut messages = self
            .run_retrieval("fetchMsgs", async |conn: &mut C::Retrieval| {
                conn.fetch_by_uid(folder, uids).await
            })
            .await?;
        messages.sort_by(|a, b| b.uid.cmp(&a.uid));
        Ok(messages)
    }

    /// Searches a folder and fetches one page of the matches, newest first.
    ///
    /// Blank text or an empty field list matches nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the search or the fetch fails.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<MessageSummary>> {
        let Some(expr) = query.expression() else {
            return Ok(Vec::new());
        };

        let uids = self.search_uids(&query.folder, &expr).await?;
        let page = uids.newest(query.page_size, query.offset);
        debug!(
            folder = %query.folder,
            matches = uids.len(),
            page = page.len(),
            "Search finished"
        );
        self.fetch_messages_by_uid(&query.folder, &page).await
    }

    /// Changes the flags of one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the change.
    pub async fn set_flags(&self, folder: &str, uid: Uid, action: &StoreAction) -> Result<()> {
        self.store("setFlags", folder, uid, action).await
    }

    /// Marks a message as read, keeping its other flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the change.
    pub async fn mark_read(&self, folder: &str, message: &MessageSummary) -> Result<()> {
        let action = StoreAction::Replace(message.flags_with(&Flag::Seen));
        self.store("markAsRead", folder, message.uid, &action).await
    }

    /// Marks a message as unread, keeping its other flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the change.
    pub async fn mark_unread(&self, folder: &str, message: &MessageSummary) -> Result<()> {
        let action = StoreAction::Replace(message.flags_without(&Flag::Seen));
        self.store("markAsUnread", folder, message.uid, &action).await
    }

    /// Flags a message `\Deleted` and expunges the folder.
    ///
    /// # Errors
    ///
    /// Returns an error if flagging or expunging fails.
    pub async fn delete_message(&self, folder: &str, uid: Uid) -> Result<()> {
        let uids = UidSet::single(uid);
        let action = StoreAction::Replace(vec![Flag::Deleted]);
        self.run_retrieval("deleteMsg", async |conn: &mut C::Retrieval| {
            conn.store_flags(folder, &uids, &action).await?;
            conn.expunge(folder).await
        })
        .await?;
        info!(folder, uid, "Message deleted");
        Ok(())
    }

    /// Flags a message `\Deleted` without expunging.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the change.
    pub async fn archive_message(&self, folder: &str, uid: Uid) -> Result<()> {
        let action = StoreAction::Replace(vec![Flag::Deleted]);
        self.store("archiveMsg", folder, uid, &action).await
    }

    /// Moves a message between folders.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the move.
    pub async fn move_message(&self, uid: Uid, from: &str, to: &str) -> Result<()> {
        let uids = UidSet::single(uid);
        self.run_retrieval("moveMsg", async |conn: &mut C::Retrieval| {
            conn.move_messages(from, &uids, to).await
        })
        .await?;
        info!(uid, from, to, "Message moved");
        Ok(())
    }

    /// Moves a message to the trash folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoTrashFolder`] when `trash` is `None`, or the move error.
    pub async fn move_to_trash(&self, uid: Uid, trash: Option<&str>, from: &str) -> Result<()> {
        let trash = trash.ok_or(Error::NoTrashFolder)?;
        self.move_message(uid, from, trash).await
    }

    /// Path of the trash folder, discovered once from the folder list.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder list cannot be fetched.
    pub async fn trash_folder_path(&self) -> Result<Option<String>> {
        let path = self
            .inner
            .trash
            .get_or_try_init(|| async {
                let folders = self.fetch_folders().await?;
                Ok::<_, Error>(find_trash(&folders))
            })
            .await?;
        Ok(path.clone())
    }

    /// Permanently removes the messages flagged `\Deleted` in a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the expunge.
    pub async fn expunge_deleted(&self, folder: &str) -> Result<()> {
        self.run_retrieval("expungeMsgs", async |conn: &mut C::Retrieval| {
            conn.expunge(folder).await
        })
        .await
    }

    /// Downloads and decodes one attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if the part cannot be fetched or decoded.
    pub async fn fetch_attachment(
        &self,
        folder: &str,
        uid: Uid,
        part: &AttachmentPart,
    ) -> Result<Vec<u8>> {
        let raw = self
            .run_retrieval("fetchMsgAtt", async |conn: &mut C::Retrieval| {
                conn.fetch_part(folder, uid, &part.part_id).await
            })
            .await?;
        decode_transfer(&raw, &part.encoding)
    }

    /// Downloads the complete RFC 822 message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be fetched.
    pub async fn fetch_message(&self, folder: &str, uid: Uid) -> Result<Vec<u8>> {
        self.run_retrieval("fetchMsg", async |conn: &mut C::Retrieval| {
            conn.fetch_raw_message(folder, uid).await
        })
        .await
    }

    /// Downloads a message and decrypts it with `engine`.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or [`Error::Crypto`] if decryption fails.
    pub async fn decrypt_message(
        &self,
        folder: &str,
        uid: Uid,
        engine: &impl CryptoEngine,
        keys: &[DecryptionKey],
    ) -> Result<Vec<u8>> {
        let ciphertext = self.fetch_message(folder, uid).await?;
        Ok(engine.decrypt(&ciphertext, keys).await?)
    }

    /// Submits a complete MIME message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is invalid or the server refuses it.
    pub async fn send_mail(&self, mime: &[u8]) -> Result<()> {
        self.inner
            .retry
            .run("send", || self.submit(mime), || self.submit(mime))
            .await
    }

    /// Logs out and drops both connections.
    pub async fn shutdown(&self) {
        self.inner.retry.teardown().await;
    }

    async fn search_uids(&self, folder: &str, expr: &SearchExpr) -> Result<UidSet> {
        self.run_retrieval("searchExpression", async |conn: &mut C::Retrieval| {
            conn.search(folder, expr).await
        })
        .await
    }

    async fn store(&self, name: &str, folder: &str, uid: Uid, action: &StoreAction) -> Result<()> {
        let uids = UidSet::single(uid);
        self.run_retrieval(name, async |conn: &mut C::Retrieval| {
            conn.store_flags(folder, &uids, action).await
        })
        .await
    }

    async fn run_retrieval<T>(
        &self,
        name: &str,
        call: impl AsyncFn(&mut C::Retrieval) -> Result<T>,
    ) -> Result<T> {
        self.inner
            .retry
            .run(name, || self.retrieve(&call), || self.retrieve(&call))
            .await
    }

    async fn retrieve<T>(&self, call: &impl AsyncFn(&mut C::Retrieval) -> Result<T>) -> Result<T> {
        let conn = self.inner.retry.sessions().retrieval().await?;
        let mut conn = conn.lock().await;
        call(&mut *conn).await
    }

    async fn submit(&self, mime: &[u8]) -> Result<()> {
        let conn = self.inner.retry.sessions().submission().await?;
        conn.send(mime).await
    }

    fn backup_config(&self) -> &BackupConfig {
        &self.inner.backup
    }
}

/// Prefers the `\Trash` special-use folder, else one named like a trash folder.
fn find_trash(folders: &[Folder]) -> Option<String> {
    folders
        .iter()
        .find(|folder| folder.has_attribute("Trash"))
        .or_else(|| {
            folders
                .iter()
                .find(|folder| folder.selectable && folder.folder_type == FolderType::Trash)
        })
        .map(|folder| folder.path.clone())
}
