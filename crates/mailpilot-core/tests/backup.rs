//! Key backup search against a scripted server.

#![allow(clippy::unwrap_used)]

mod common;

use common::{Fault, Server, attachment, catalog, message};
use mailpilot_core::{BackupStage, Error, TransferEncoding};

const ME: &str = "me@example.com";

fn gmail_folders(server: &Server) {
    server.add_folder("INBOX", &["\\HasNoChildren"]);
    server.add_folder("[Gmail]", &["\\Noselect", "\\HasChildren"]);
    server.add_folder("[Gmail]/All Mail", &["\\All", "\\HasNoChildren"]);
    server.add_folder("[Gmail]/Spam", &["\\Junk", "\\HasNoChildren"]);
}

fn backup_message(server: &Server, folder: &str, uid: u32, payload: &[u8]) {
    let mut msg = message(uid, uid, "Your FlowCrypt Backup");
    msg.attachments = vec![attachment("2", TransferEncoding::SevenBit)];
    server.add_message(folder, msg);
    server.add_part(uid, "2", payload);
}

#[tokio::test]
async fn test_backups_concatenated_with_newlines() {
    let server = Server::new();
    gmail_folders(&server);
    backup_message(&server, "[Gmail]/All Mail", 3, b"-----KEY A-----");
    backup_message(&server, "[Gmail]/All Mail", 8, b"-----KEY B-----");
    server.set_search_hits("[Gmail]/All Mail", &[3, 8]);
    let (catalog, _) = catalog(&server, false);

    let backups = catalog.search_backups(ME).await.unwrap();

    assert_eq!(backups, b"-----KEY B-----\n-----KEY A-----\n");

    let searches = server.searches.lock().unwrap().clone();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].0, "[Gmail]/All Mail");
    assert!(searches[0].1.starts_with(
        "(OR (FROM \"me@example.com\") (TO \"me@example.com\")) (OR (OR (SUBJECT \"Your FlowCrypt Backup\")"
    ));
}

#[tokio::test]
async fn test_folders_without_matches_are_skipped() {
    let server = Server::new();
    server.add_folder("INBOX", &[]);
    server.add_folder("Sent", &["\\Sent"]);
    server.add_folder("Trash", &["\\Trash"]);
    backup_message(&server, "Sent", 12, b"key");
    server.set_search_hits("Sent", &[12]);
    let (catalog, _) = catalog(&server, false);

    let backups = catalog.search_backups(ME).await.unwrap();

    assert_eq!(backups, b"key\n");
    let searched: Vec<String> = server
        .searches
        .lock()
        .unwrap()
        .iter()
        .map(|(folder, _)| folder.clone())
        .collect();
    assert_eq!(searched, ["INBOX", "Sent"]);
}

#[tokio::test]
async fn test_no_candidate_folders() {
    let server = Server::new();
    server.add_folder("[Gmail]", &["\\Noselect"]);
    server.add_folder("Spam", &[]);
    let (catalog, _) = catalog(&server, false);

    let result = catalog.search_backups(ME).await;

    assert!(matches!(result, Err(Error::Backup(BackupStage::Folders))));
}

#[tokio::test]
async fn test_no_matching_uids() {
    let server = Server::new();
    gmail_folders(&server);
    let (catalog, _) = catalog(&server, false);

    let err = catalog.search_backups(ME).await.unwrap_err();

    assert!(matches!(err, Error::Backup(BackupStage::Uids)));
    assert_eq!(err.to_string(), "backup search: stage `uids` produced nothing");
}

#[tokio::test]
async fn test_matches_vanished_before_fetch() {
    let server = Server::new();
    gmail_folders(&server);
    server.set_search_hits("[Gmail]/All Mail", &[77]);
    let (catalog, _) = catalog(&server, false);

    let result = catalog.search_backups(ME).await;

    assert!(matches!(result, Err(Error::Backup(BackupStage::Messages))));
}

#[tokio::test]
async fn test_messages_without_attachments() {
    let server = Server::new();
    gmail_folders(&server);
    server.add_message("[Gmail]/All Mail", message(5, 5, "Your CryptUp Backup"));
    server.set_search_hits("[Gmail]/All Mail", &[5]);
    let (catalog, _) = catalog(&server, false);

    let result = catalog.search_backups(ME).await;

    assert!(matches!(result, Err(Error::Backup(BackupStage::Attachments))));
}

#[tokio::test]
async fn test_backup_search_survives_a_dropped_connection() {
    let server = Server::new();
    gmail_folders(&server);
    backup_message(&server, "[Gmail]/All Mail", 3, b"key");
    server.set_search_hits("[Gmail]/All Mail", &[3]);
    server.fail_next(&[Fault::Dropped]);
    let (catalog, _) = catalog(&server, false);

    let backups = catalog.search_backups(ME).await.unwrap();

    assert_eq!(backups, b"key\n");
    assert_eq!(server.connects(), 2);
}
