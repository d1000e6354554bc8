//! Mailbox domain types.

use std::collections::BTreeSet;
use std::fmt;

/// IMAP unique identifier of a message within a folder.
pub type Uid = u32;

/// A folder in the mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// Full path (including hierarchy).
    pub path: String,
    /// Last path segment.
    pub name: String,
    /// Hierarchy delimiter, if the server reported one.
    pub delimiter: Option<String>,
    /// Raw LIST attributes, e.g. `\Trash` or `\Noselect`.
    pub attributes: Vec<String>,
    /// Whether the folder can be selected.
    pub selectable: bool,
    /// Role of the folder.
    pub folder_type: FolderType,
}

impl Folder {
    /// Builds a folder from a LIST entry.
    #[must_use]
    pub fn from_list(path: impl Into<String>, delimiter: Option<String>, attributes: Vec<String>) -> Self {
        let path = path.into();
        let name = delimiter
            .as_deref()
            .and_then(|delim| path.rsplit(delim).next())
            .unwrap_or(&path)
            .to_string();
        let selectable = !attributes.iter().any(|attr| {
            let lower = attr.to_ascii_lowercase();
            lower.contains("noselect") || lower.contains("nonexistent")
        });
        let folder_type = FolderType::detect(&path, &attributes);

        Self {
            path,
            name,
            delimiter,
            attributes,
            selectable,
            folder_type,
        }
    }

    /// Returns true when the folder carries the given attribute.
    #[must_use]
    pub fn has_attribute(&self, attribute: &str) -> bool {
        let wanted = attribute.trim_start_matches('\\');
        self.attributes
            .iter()
            .any(|attr| attr.trim_start_matches('\\').eq_ignore_ascii_case(wanted))
    }
}

/// Type of folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderType {
    /// Inbox folder.
    Inbox,
    /// Sent mail folder.
    Sent,
    /// Drafts folder.
    Drafts,
    /// Trash folder.
    Trash,
    /// Spam/junk folder.
    Spam,
    /// Archive folder.
    Archive,
    /// Virtual folder holding every message.
    AllMail,
    /// Regular folder.
    Regular,
}

impl FolderType {
    /// Detects the folder role, preferring special-use attributes over the name.
    #[must_use]
    pub fn detect(path: &str, attributes: &[String]) -> Self {
        for attr in attributes {
            let attr = attr.trim_start_matches('\\').to_ascii_lowercase();
            match attr.as_str() {
                "trash" => return Self::Trash,
                "sent" => return Self::Sent,
                "drafts" => return Self::Drafts,
                "junk" => return Self::Spam,
                "archive" => return Self::Archive,
                "all" => return Self::AllMail,
                _ => {}
            }
        }
        Self::from_name(path)
    }

    /// Detects the folder role from its name alone.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower == "inbox" {
            Self::Inbox
        } else if lower.ends_with("all mail") {
            Self::AllMail
        } else if lower.contains("sent") {
            Self::Sent
        } else if lower.contains("draft") {
            Self::Drafts
        } else if lower.contains("trash") || lower.contains("deleted") {
            Self::Trash
        } else if lower.contains("spam") || lower.contains("junk") {
            Self::Spam
        } else if lower.contains("archive") {
            Self::Archive
        } else {
            Self::Regular
        }
    }
}

/// Counters for a selected folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderStatus {
    /// Number of messages.
    pub total: u32,
    /// First unseen message, if reported.
    pub unseen: Option<u32>,
    /// Next UID to be assigned.
    pub uid_next: Option<u32>,
    /// UID validity.
    pub uid_validity: Option<u32>,
}

/// Message flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// `\Seen`
    Seen,
    /// `\Answered`
    Answered,
    /// `\Flagged`
    Flagged,
    /// `\Deleted`
    Deleted,
    /// `\Draft`
    Draft,
    /// `\Recent`
    Recent,
    /// Keyword or unknown system flag.
    Custom(String),
}

impl Flag {
    /// Wire form of the flag.
    #[must_use]
    pub fn as_imap(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Custom(name) => name,
        }
    }
}

/// How a STORE changes the flags of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Adds flags.
    Add(Vec<Flag>),
    /// Removes flags.
    Remove(Vec<Flag>),
    /// Replaces all flags.
    Replace(Vec<Flag>),
}

impl StoreAction {
    /// Renders the STORE data item.
    #[must_use]
    pub fn to_imap(&self) -> String {
        let (prefix, flags) = match self {
            Self::Add(flags) => ("+", flags),
            Self::Remove(flags) => ("-", flags),
            Self::Replace(flags) => ("", flags),
        };
        let flags: Vec<&str> = flags
            .iter()
            .filter(|flag| **flag != Flag::Recent)
            .map(Flag::as_imap)
            .collect();
        format!("{prefix}FLAGS.SILENT ({})", flags.join(" "))
    }
}

/// Content-Transfer-Encoding of a body part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    /// `7bit`
    SevenBit,
    /// `8bit`
    EightBit,
    /// `binary`
    Binary,
    /// `base64`
    Base64,
    /// `quoted-printable`
    QuotedPrintable,
    /// Anything else.
    Other(String),
}

impl TransferEncoding {
    /// Parses the header value, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "7bit" => Self::SevenBit,
            "8bit" => Self::EightBit,
            "binary" => Self::Binary,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            other => Self::Other(other.to_string()),
        }
    }
}

/// An attachment found in a message's body structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPart {
    /// IMAP section number, e.g. `2` or `1.3`.
    pub part_id: String,
    /// File name from the disposition or content type.
    pub filename: Option<String>,
    /// MIME type, lowercase.
    pub mime_type: String,
    /// Transfer encoding of the stored bytes.
    pub encoding: TransferEncoding,
    /// Encoded size in octets.
    pub size: u32,
}

/// Summary of a message as listed in a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    /// Unique identifier.
    pub uid: Uid,
    /// Sequence number at fetch time.
    pub sequence: u32,
    /// Message subject.
    pub subject: String,
    /// Sender addresses.
    pub from: Vec<String>,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Date header.
    pub date: Option<String>,
    /// Flags at fetch time.
    pub flags: Vec<Flag>,
    /// RFC 822 size.
    pub size: Option<u32>,
    /// Attachment parts.
    pub attachments: Vec<AttachmentPart>,
}

impl MessageSummary {
    /// Whether the message has been read.
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.flags.contains(&Flag::Seen)
    }

    /// Flags with `flag` added.
    #[must_use]
    pub fn flags_with(&self, flag: &Flag) -> Vec<Flag> {
        let mut flags = self.flags.clone();
        if !flags.contains(flag) {
            flags.push(flag.clone());
        }
        flags
    }

    /// Flags with `flag` removed.
    #[must_use]
    pub fn flags_without(&self, flag: &Flag) -> Vec<Flag> {
        self.flags.iter().filter(|f| *f != flag).cloned().collect()
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    /// Messages, newest first.
    pub messages: Vec<MessageSummary>,
    /// Messages in the folder.
    pub total: u32,
}

/// Ordered set of UIDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidSet(BTreeSet<Uid>);

impl UidSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Set holding one UID.
    #[must_use]
    pub fn single(uid: Uid) -> Self {
        Self(BTreeSet::from([uid]))
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of UIDs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// UIDs in ascending order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Uid> + '_ {
        self.0.iter().copied()
    }

    /// Newest `page_size` UIDs after skipping the newest `offset`.
    ///
    /// A `page_size` of 0 keeps every remaining UID.
    #[must_use]
    pub fn newest(&self, page_size: u32, offset: u32) -> Self {
        let take = if page_size == 0 {
            usize::MAX
        } else {
            page_size as usize
        };
        self.0
            .iter()
            .rev()
            .skip(offset as usize)
            .take(take)
            .copied()
            .collect()
    }
}

impl FromIterator<Uid> for UidSet {
    fn from_iter<I: IntoIterator<Item = Uid>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for UidSet {
    /// Sequence-set syntax with contiguous runs collapsed: `1:3,7,9:10`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut uids = self.0.iter().copied().peekable();
        let mut first = true;
        while let Some(start) = uids.next() {
            let mut end = start;
            while uids.peek() == Some(&end.saturating_add(1)) && end != Uid::MAX {
                end += 1;
                uids.next();
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}:{end}")?;
            }
        }
        Ok(())
    }
}
