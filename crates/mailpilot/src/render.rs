//! Plain-text output lines.

use mailpilot_core::{Folder, FolderType, MessageSummary};

/// `path  [role]`, with non-selectable folders marked.
pub fn folder_line(folder: &Folder) -> String {
    let mut line = folder.path.clone();
    let role = match folder.folder_type {
        FolderType::Inbox => Some("inbox"),
        FolderType::Sent => Some("sent"),
        FolderType::Drafts => Some("drafts"),
        FolderType::Trash => Some("trash"),
        FolderType::Spam => Some("spam"),
        FolderType::Archive => Some("archive"),
        FolderType::AllMail => Some("all mail"),
        FolderType::Regular => None,
    };
    if let Some(role) = role {
        line.push_str(&format!("  [{role}]"));
    }
    if !folder.selectable {
        line.push_str("  (not selectable)");
    }
    line
}

/// `uid  *  from  subject  (n attachments)`; `*` marks unread messages.
pub fn message_line(message: &MessageSummary) -> String {
    let marker = if message.is_read() { ' ' } else { '*' };
    let from = message.from.first().map_or("(unknown sender)", String::as_str);
    let subject = if message.subject.is_empty() {
        "(no subject)"
    } else {
        &message.subject
    };

    let mut line = format!("{:>8} {marker} {from}  {subject}", message.uid);
    match message.attachments.len() {
        0 => {}
        1 => line.push_str("  (1 attachment)"),
        n => line.push_str(&format!("  ({n} attachments)")),
    }
    line
}
