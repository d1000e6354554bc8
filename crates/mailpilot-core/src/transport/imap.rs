//! IMAP retrieval over implicit TLS.

use async_imap::types::{Fetch, Flag as ImapFlag, Mailbox, Name, NameAttribute};
use futures::TryStreamExt;
use imap_proto::types::{
    Address, BodyContentCommon, BodyContentSinglePart, BodyStructure, ContentEncoding, SectionPath,
};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info, warn};

use super::{RetrievalConnection, create_tls_connector};
use crate::error::{Error, Result, looks_like_auth_failure, looks_like_dropped};
use crate::model::{
    AttachmentPart, Flag, Folder, FolderStatus, MessageSummary, StoreAction, TransferEncoding, Uid,
    UidSet,
};
use crate::range::SequenceRange;
use crate::search::SearchExpr;
use crate::session::{Credential, MailSession};

/// Byte stream an IMAP session runs over.
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + std::fmt::Debug + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + std::fmt::Debug + Send> ImapStream for T {}

/// Items fetched for message summaries.
const SUMMARY_QUERY: &str = "(UID FLAGS ENVELOPE INTERNALDATE RFC822.SIZE BODYSTRUCTURE)";

impl From<async_imap::error::Error> for Error {
    fn from(err: async_imap::error::Error) -> Self {
        use async_imap::error::Error as ImapError;

        match err {
            ImapError::Io(e) => Self::dropped(e),
            ImapError::ConnectionLost => Self::ConnectionDropped("connection lost".to_string()),
            ImapError::No(text) | ImapError::Bad(text) if looks_like_auth_failure(&text) => {
                Self::Authentication(text)
            }
            ImapError::No(text) => Self::Server(format!("NO {text}")),
            ImapError::Bad(text) => Self::Server(format!("BAD {text}")),
            ImapError::Parse(e) => Self::MalformedResponse(e.to_string()),
            other => {
                let text = other.to_string();
                if looks_like_dropped(&text) {
                    Self::ConnectionDropped(text)
                } else {
                    Self::Server(text)
                }
            }
        }
    }
}

/// A rejected LOGIN or AUTHENTICATE is always a credential problem.
fn login_error(err: async_imap::error::Error) -> Error {
    use async_imap::error::Error as ImapError;

    match err {
        ImapError::No(text) | ImapError::Bad(text) => Error::Authentication(text),
        other => other.into(),
    }
}

/// XOAUTH2 SASL exchange.
struct XOAuth2 {
    payload: Vec<u8>,
    sent: bool,
}

impl async_imap::Authenticator for XOAuth2 {
    type Response = Vec<u8>;

    fn process(&mut self, _challenge: &[u8]) -> Self::Response {
        if self.sent {
            // Error challenge; an empty reply lets the server finish with NO.
            Vec::new()
        } else {
            self.sent = true;
            self.payload.clone()
        }
    }
}

/// Logged-in IMAP session.
pub struct ImapConnection<T: ImapStream = TlsStream<TcpStream>> {
    session: async_imap::Session<T>,
    selected: Option<String>,
}

impl<T: ImapStream> std::fmt::Debug for ImapConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnection")
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

impl ImapConnection {
    /// Connects with TLS and logs in with the session's credential.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting, the TLS handshake or login fails.
    pub async fn connect(session: &MailSession) -> Result<Self> {
        let tcp = TcpStream::connect((session.host.as_str(), session.port))
            .await
            .map_err(Error::dropped)?;

        let server_name = ServerName::try_from(session.host.clone())
            .map_err(|e| Error::Config(format!("invalid server name {}: {e}", session.host)))?;
        let tls = create_tls_connector()?
            .connect(server_name, tcp)
            .await
            .map_err(Error::dropped)?;

        ImapConnection::establish(tls, session).await
    }
}

impl<T: ImapStream> ImapConnection<T> {
    /// Reads the greeting from an open stream and logs in.
    async fn establish(stream: T, session: &MailSession) -> Result<Self> {
        let mut client = async_imap::Client::new(stream);

        // AUTHENTICATE would otherwise read the greeting as its continuation.
        let _greeting = client.read_response().await.map_err(Error::dropped)?;

        let imap = match &session.credential {
            Credential::Password(password) => client
                .login(&session.username, password)
                .await
                .map_err(|(e, _)| login_error(e))?,
            Credential::OAuthToken(token) => {
                let auth = XOAuth2 {
                    payload: mailpilot_oauth::sasl::xoauth2_payload(&session.username, token)
                        .into_bytes(),
                    sent: false,
                };
                client
                    .authenticate("XOAUTH2", auth)
                    .await
                    .map_err(|(e, _)| login_error(e))?
            }
        };

        info!(host = %session.host, user = %session.username, "IMAP session established");
        Ok(Self {
            session: imap,
            selected: None,
        })
    }

    async fn select(&mut self, folder: &str) -> Result<Mailbox> {
        self.selected = None;
        let mailbox = self.session.select(folder).await?;
        self.selected = Some(folder.to_string());
        Ok(mailbox)
    }

    async fn ensure_selected(&mut self, folder: &str) -> Result<()> {
        if self.selected.as_deref() != Some(folder) {
            self.select(folder).await?;
        }
        Ok(())
    }

    async fn uid_fetch(&mut self, folder: &str, uids: &str, query: &str) -> Result<Vec<Fetch>> {
        self.ensure_selected(folder).await?;
        let fetches = self.session.uid_fetch(uids, query).await?.try_collect().await?;
        Ok(fetches)
    }
}

impl<T: ImapStream> RetrievalConnection for ImapConnection<T> {
    async fn list_folders(&mut self) -> Result<Vec<Folder>> {
        let names: Vec<Name> = self
            .session
            .list(Some(""), Some("*"))
            .await?
            .try_collect()
            .await?;

        Ok(names
            .iter()
            .map(|name| {
                Folder::from_list(
                    name.name(),
                    name.delimiter().map(ToString::to_string),
                    name.attributes().iter().filter_map(attribute_name).collect(),
                )
            })
            .collect())
    }

    async fn folder_status(&mut self, folder: &str) -> Result<FolderStatus> {
        let mailbox = self.select(folder).await?;
        Ok(FolderStatus {
            total: mailbox.exists,
            unseen: mailbox.unseen,
            uid_next: mailbox.uid_next,
            uid_validity: mailbox.uid_validity,
        })
    }

    async fn fetch_by_sequence(
        &mut self,
        folder: &str,
        range: SequenceRange,
    ) -> Result<Vec<MessageSummary>> {
        self.ensure_selected(folder).await?;
        let fetches: Vec<Fetch> = self
            .session
            .fetch(range.to_string(), SUMMARY_QUERY)
            .await?
            .try_collect()
            .await?;
        Ok(summaries(&fetches))
    }

    async fn fetch_by_uid(&mut self, folder: &str, uids: &UidSet) -> Result<Vec<MessageSummary>> {
        let fetches = self.uid_fetch(folder, &uids.to_string(), SUMMARY_QUERY).await?;
        Ok(summaries(&fetches))
    }

    async fn search(&mut self, folder: &str, expr: &SearchExpr) -> Result<UidSet> {
        self.ensure_selected(folder).await?;
        let uids = self.session.uid_search(expr.to_query()).await?;
        Ok(uids.into_iter().collect())
    }

    async fn store_flags(&mut self, folder: &str, uids: &UidSet, action: &StoreAction) -> Result<()> {
        self.ensure_selected(folder).await?;
        let _: Vec<Fetch> = self
            .session
            .uid_store(uids.to_string(), action.to_imap())
            .await?
            .try_collect()
            .await?;
        Ok(())
    }

    async fn move_messages(&mut self, folder: &str, uids: &UidSet, destination: &str) -> Result<()> {
        use async_imap::error::Error as ImapError;

        self.ensure_selected(folder).await?;
        let uid_set = uids.to_string();
        match self.session.uid_mv(&uid_set, destination).await {
            Ok(()) => Ok(()),
            Err(ImapError::No(text) | ImapError::Bad(text)) => {
                debug!(reason = %text, "UID MOVE refused, falling back to COPY and expunge");
                self.session.uid_copy(&uid_set, destination).await?;
                let _: Vec<Fetch> = self
                    .session
                    .uid_store(&uid_set, "+FLAGS.SILENT (\\Deleted)")
                    .await?
                    .try_collect()
                    .await?;

                if self.session.capabilities().await?.has_str("UIDPLUS") {
                    let _: Vec<u32> = self.session.uid_expunge(&uid_set).await?.try_collect().await?;
                } else {
                    warn!(
                        folder,
                        "Server lacks UIDPLUS, expunging every deleted message in the folder"
                    );
                    let _: Vec<u32> = self.session.expunge().await?.try_collect().await?;
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn expunge(&mut self, folder: &str) -> Result<()> {
        self.ensure_selected(folder).await?;
        let _: Vec<u32> = self.session.expunge().await?.try_collect().await?;
        Ok(())
    }

    async fn fetch_part(&mut self, folder: &str, uid: Uid, part_id: &str) -> Result<Vec<u8>> {
        let section = part_id
            .split('.')
            .map(str::parse::<u32>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::Config(format!("invalid part id {part_id}")))?;
        let path = SectionPath::Part(section, None);

        let fetches = self
            .uid_fetch(folder, &uid.to_string(), &format!("BODY.PEEK[{part_id}]"))
            .await?;
        fetches
            .iter()
            .find_map(|fetch| fetch.section(&path))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::MissingMessageInfo {
                folder: folder.to_string(),
                uid,
                item: "the requested body part",
            })
    }

    async fn fetch_raw_message(&mut self, folder: &str, uid: Uid) -> Result<Vec<u8>> {
        let fetches = self
            .uid_fetch(folder, &uid.to_string(), "BODY.PEEK[]")
            .await?;
        fetches
            .iter()
            .find_map(Fetch::body)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::MissingMessageInfo {
                folder: folder.to_string(),
                uid,
                item: "its body",
            })
    }

    async fn logout(&mut self) -> Result<()> {
        self.session.logout().await?;
        Ok(())
    }
}

/// Renders a LIST attribute as `\Name`.
fn attribute_name(attr: &NameAttribute<'_>) -> Option<String> {
    let name = match attr {
        NameAttribute::NoInferiors => "\\Noinferiors",
        NameAttribute::NoSelect => "\\Noselect",
        NameAttribute::Marked => "\\Marked",
        NameAttribute::Unmarked => "\\Unmarked",
        NameAttribute::All => "\\All",
        NameAttribute::Archive => "\\Archive",
        NameAttribute::Drafts => "\\Drafts",
        NameAttribute::Flagged => "\\Flagged",
        NameAttribute::Junk => "\\Junk",
        NameAttribute::Sent => "\\Sent",
        NameAttribute::Trash => "\\Trash",
        NameAttribute::Extension(name) => return Some(name.to_string()),
        _ => return None,
    };
    Some(name.to_string())
}

fn summaries(fetches: &[Fetch]) -> Vec<MessageSummary> {
    fetches
        .iter()
        .filter_map(|fetch| {
            let summary = summary_from_fetch(fetch);
            if summary.is_none() {
                debug!(sequence = fetch.message, "Skipping FETCH response without UID");
            }
            summary
        })
        .collect()
}

fn summary_from_fetch(fetch: &Fetch) -> Option<MessageSummary> {
    let uid = fetch.uid?;
    let envelope = fetch.envelope();

    let subject = envelope
        .and_then(|env| env.subject.as_deref())
        .map(decode_header_text)
        .unwrap_or_default();
    let from = envelope
        .and_then(|env| env.from.as_ref())
        .map(|addrs| addrs.iter().map(format_address).collect())
        .unwrap_or_default();
    let to = envelope
        .and_then(|env| env.to.as_ref())
        .map(|addrs| addrs.iter().map(format_address).collect())
        .unwrap_or_default();
    let date = envelope
        .and_then(|env| env.date.as_deref())
        .map(|date| String::from_utf8_lossy(date).into_owned());

    let mut attachments = Vec::new();
    if let Some(structure) = fetch.bodystructure() {
        collect_attachments(structure, "", &mut attachments);
    }

    Some(MessageSummary {
        uid,
        sequence: fetch.message,
        subject,
        from,
        to,
        date,
        flags: fetch.flags().map(convert_flag).collect(),
        size: fetch.size,
        attachments,
    })
}

fn convert_flag(flag: ImapFlag<'_>) -> Flag {
    match flag {
        ImapFlag::Seen => Flag::Seen,
        ImapFlag::Answered => Flag::Answered,
        ImapFlag::Flagged => Flag::Flagged,
        ImapFlag::Deleted => Flag::Deleted,
        ImapFlag::Draft => Flag::Draft,
        ImapFlag::Recent => Flag::Recent,
        ImapFlag::Custom(name) => Flag::Custom(name.into_owned()),
        other => Flag::Custom(format!("{other:?}")),
    }
}

fn format_address(addr: &Address<'_>) -> String {
    let mailbox = addr.mailbox.as_deref().map(String::from_utf8_lossy);
    let host = addr.host.as_deref().map(String::from_utf8_lossy);
    let email = match (mailbox, host) {
        (Some(m), Some(h)) => format!("{m}@{h}"),
        (Some(m), None) => m.into_owned(),
        _ => String::new(),
    };

    if let Some(name) = addr.name.as_deref().map(decode_header_text)
        && !name.is_empty()
    {
        return format!("{name} <{email}>");
    }
    email
}

/// Decodes RFC 2047 encoded words in a header value.
fn decode_header_text(raw: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(raw);
    if !lossy.contains("=?") {
        return lossy.into_owned();
    }
    let header = format!("X: {lossy}");
    match mailparse::parse_header(header.as_bytes()) {
        Ok((parsed, _)) => parsed.get_value(),
        Err(_) => lossy.into_owned(),
    }
}

fn child_path(parent: &str, index: usize) -> String {
    if parent.is_empty() {
        index.to_string()
    } else {
        format!("{parent}.{index}")
    }
}

/// Walks a body structure collecting attachment parts.
///
/// `path` is the section number of `structure`; empty for the message root.
fn collect_attachments(structure: &BodyStructure<'_>, path: &str, found: &mut Vec<AttachmentPart>) {
    match structure {
        BodyStructure::Multipart { bodies, .. } => {
            for (index, body) in bodies.iter().enumerate() {
                collect_attachments(body, &child_path(path, index + 1), found);
            }
        }
        BodyStructure::Basic { common, other, .. } | BodyStructure::Text { common, other, .. } => {
            if is_attachment(common, other) {
                found.push(attachment_part(path, common, other));
            }
        }
        BodyStructure::Message {
            common, other, body, ..
        } => {
            if is_attachment(common, other) {
                found.push(attachment_part(path, common, other));
            } else if matches!(**body, BodyStructure::Multipart { .. }) {
                collect_attachments(body, path, found);
            } else {
                collect_attachments(body, &child_path(path, 1), found);
            }
        }
    }
}

fn is_attachment(common: &BodyContentCommon<'_>, other: &BodyContentSinglePart<'_>) -> bool {
    let disposition = common
        .disposition
        .as_ref()
        .map(|disp| disp.ty.to_ascii_lowercase());

    match disposition.as_deref() {
        Some("attachment") => true,
        // Inline parts with a Content-ID are embedded images.
        Some("inline") => other.id.is_none() && part_filename(common).is_some(),
        _ => {
            let ty = common.ty.ty.to_ascii_lowercase();
            other.id.is_none() && !matches!(ty.as_str(), "text" | "multipart" | "message")
        }
    }
}

fn part_filename(common: &BodyContentCommon<'_>) -> Option<String> {
    let from_disposition = common
        .disposition
        .as_ref()
        .and_then(|disp| disp.params.as_ref())
        .and_then(|params| find_param(params, "filename"));
    let from_type = common
        .ty
        .params
        .as_ref()
        .and_then(|params| find_param(params, "name"));

    from_disposition
        .or(from_type)
        .map(|name| decode_header_text(name.as_bytes()))
}

fn find_param<'a>(
    params: &'a [(std::borrow::Cow<'_, str>, std::borrow::Cow<'_, str>)],
    key: &str,
) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_ref())
}

fn attachment_part(
    path: &str,
    common: &BodyContentCommon<'_>,
    other: &BodyContentSinglePart<'_>,
) -> AttachmentPart {
    let part_id = if path.is_empty() { "1" } else { path };
    AttachmentPart {
        part_id: part_id.to_string(),
        filename: part_filename(common),
        mime_type: format!("{}/{}", common.ty.ty, common.ty.subtype).to_ascii_lowercase(),
        encoding: convert_encoding(&other.transfer_encoding),
        size: other.octets,
    }
}

fn convert_encoding(encoding: &ContentEncoding<'_>) -> TransferEncoding {
    match encoding {
        ContentEncoding::SevenBit => TransferEncoding::SevenBit,
        ContentEncoding::EightBit => TransferEncoding::EightBit,
        ContentEncoding::Binary => TransferEncoding::Binary,
        ContentEncoding::Base64 => TransferEncoding::Base64,
        ContentEncoding::QuotedPrintable => TransferEncoding::QuotedPrintable,
        ContentEncoding::Other(other) => TransferEncoding::parse(other),
    }
}
