//! Key backup search.
//!
//! Backups are messages the account sent to itself with one of a few known
//! subjects. The pipeline runs folders, matching UIDs, messages, attachment
//! parts and payloads in order; a stage that finds nothing ends the search.

use tracing::{debug, info};

use super::OperationCatalog;
use crate::error::{BackupStage, Error, Result};
use crate::model::{AttachmentPart, Folder, FolderType, Uid, UidSet};
use crate::search::backup_expression;
use crate::session::renewal::TokenRenewalService;
use crate::transport::Connector;

/// Folders worth searching for backups.
///
/// Drops non-selectable folders and those on the ignore list. When an
/// all-mail folder remains, only it is kept.
#[must_use]
pub fn candidate_folders<'a>(folders: &'a [Folder], ignored: &[String]) -> Vec<&'a Folder> {
    let candidates: Vec<&Folder> = folders
        .iter()
        .filter(|folder| folder.selectable)
        .filter(|folder| {
            !ignored
                .iter()
                .any(|path| path.eq_ignore_ascii_case(&folder.path))
        })
        .collect();

    let all_mail: Vec<&Folder> = candidates
        .iter()
        .copied()
        .filter(|folder| folder.folder_type == FolderType::AllMail)
        .collect();

    if all_mail.is_empty() {
        candidates
    } else {
        all_mail
    }
}

impl<C: Connector, R: TokenRenewalService> OperationCatalog<C, R> {
    /// Collects every backup attachment exchanged with `email`.
    ///
    /// Payloads are concatenated, each followed by a `\n` byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backup`] naming the first stage that found nothing,
    /// or the error of a failed operation.
    pub async fn search_backups(&self, email: &str) -> Result<Vec<u8>> {
        let config = self.backup_config();
        let expr = backup_expression(email, &config.subjects)
            .ok_or_else(|| Error::Config("no backup subjects configured".to_string()))?;

        let folders = self.fetch_folders().await?;
        let candidates = candidate_folders(&folders, &config.ignored_folders);
        if candidates.is_empty() {
            return Err(Error::Backup(BackupStage::Folders));
        }
        debug!(folders = candidates.len(), "Searching for backups");

        let mut matches: Vec<(&str, UidSet)> = Vec::new();
        for folder in candidates {
            let uids = self.search_uids(&folder.path, &expr).await?;
            if uids.is_empty() {
                continue;
            }
            matches.push((folder.path.as_str(), uids));
        }
        if matches.is_empty() {
            return Err(Error::Backup(BackupStage::Uids));
        }

        let mut messages = Vec::new();
        for (folder, uids) in &matches {
            for message in self.fetch_messages_by_uid(folder, uids).await? {
                messages.push((*folder, message));
            }
        }
        if messages.is_empty() {
            return Err(Error::Backup(BackupStage::Messages));
        }

        let parts: Vec<(&str, Uid, &AttachmentPart)> = messages
            .iter()
            .flat_map(|(folder, message)| {
                message
                    .attachments
                    .iter()
                    .map(move |part| (*folder, message.uid, part))
            })
            .collect();
        if parts.is_empty() {
            return Err(Error::Backup(BackupStage::Attachments));
        }

        let mut payload = Vec::new();
        for (folder, uid, part) in parts {
            payload.extend(self.fetch_attachment(folder, uid, part).await?);
            payload.push(b'\n');
        }

        info!(
            messages = messages.len(),
            bytes = payload.len(),
            "Backup search finished"
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(path: &str, attributes: &[&str]) -> Folder {
        Folder::from_list(
            path,
            Some("/".to_string()),
            attributes.iter().map(ToString::to_string).collect(),
        )
    }

    fn ignored() -> Vec<String> {
        crate::config::BackupConfig::default().ignored_folders
    }

    fn paths(folders: &[&Folder]) -> Vec<String> {
        folders.iter().map(|folder| folder.path.clone()).collect()
    }

    #[test]
    fn test_noise_folders_dropped() {
        let folders = vec![
            folder("INBOX", &[]),
            folder("[Gmail]", &["\\Noselect"]),
            folder("Spam", &[]),
            folder("Deleted Items", &[]),
            folder("Sent", &["\\Sent"]),
        ];
        assert_eq!(paths(&candidate_folders(&folders, &ignored())), ["INBOX", "Sent"]);
    }

    #[test]
    fn test_all_mail_preferred() {
        let folders = vec![
            folder("INBOX", &[]),
            folder("[Gmail]/All Mail", &["\\All", "\\HasNoChildren"]),
            folder("[Gmail]/Sent Mail", &["\\Sent"]),
            folder("[Gmail]/Trash", &["\\Trash"]),
        ];
        assert_eq!(
            paths(&candidate_folders(&folders, &ignored())),
            ["[Gmail]/All Mail"]
        );
    }

    #[test]
    fn test_all_mail_detected_by_name() {
        let folders = vec![folder("INBOX", &[]), folder("[Gmail]/All Mail", &[])];
        assert_eq!(
            paths(&candidate_folders(&folders, &ignored())),
            ["[Gmail]/All Mail"]
        );
    }

    #[test]
    fn test_nothing_left() {
        let folders = vec![folder("Trash", &[]), folder("[Gmail]", &["\\Noselect"])];
        assert!(candidate_folders(&folders, &ignored()).is_empty());
    }
}
