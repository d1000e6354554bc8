//! `mailpilot` - command-line front end for the mail engine.
//!
//! Loads one account, runs one command against it and prints the result.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod render;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use mailpilot_core::{AccountConfig, MailConnector, OperationCatalog, SearchQuery};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Talk to one mail account.
#[derive(Debug, Parser)]
#[command(name = "mailpilot", version, about)]
struct Cli {
    /// Account file; defaults to `<config dir>/mailpilot/account.json`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every folder.
    Folders,
    /// Show the newest messages of a folder.
    List {
        /// Folder path.
        folder: String,
        /// Messages per page.
        #[arg(default_value_t = 20)]
        count: u32,
        /// Newest messages to skip.
        #[arg(default_value_t = 0)]
        offset: u32,
    },
    /// Search a folder in every field.
    Search {
        /// Folder path.
        folder: String,
        /// Text to look for.
        text: String,
    },
    /// Print the key backups found in the mailbox.
    Backups {
        /// Address the backups were exchanged with; the account's by default.
        email: Option<String>,
    },
    /// Send a complete MIME message read from a file.
    Send {
        /// Path to the RFC 822 message.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailpilot=info,mailpilot_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    let config = AccountConfig::load(&path)
        .with_context(|| format!("loading account from {}", path.display()))?;
    config.validate()?;
    info!(account = %config.email, "Starting mailpilot");

    let renewal = config.renewal()?;
    let email = config.email.clone();
    let backup = config.backup.clone();
    let catalog = OperationCatalog::new(MailConnector, config, renewal, backup)?;

    let outcome = run(&catalog, cli.command, &email).await;
    catalog.shutdown().await;
    outcome
}

async fn run(
    catalog: &OperationCatalog<MailConnector, mailpilot_core::Renewal>,
    command: Command,
    account_email: &str,
) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();

    match command {
        Command::Folders => {
            for folder in catalog.fetch_folders().await? {
                writeln!(out, "{}", render::folder_line(&folder))?;
            }
        }
        Command::List {
            folder,
            count,
            offset,
        } => {
            let page = catalog.fetch_messages(&folder, count, offset).await?;
            writeln!(out, "{folder}: {} messages", page.total)?;
            for message in &page.messages {
                writeln!(out, "{}", render::message_line(message))?;
            }
        }
        Command::Search { folder, text } => {
            let query = SearchQuery::new(text).in_folder(folder);
            let messages = catalog.search(&query).await?;
            if messages.is_empty() {
                writeln!(out, "No messages found")?;
            }
            for message in &messages {
                writeln!(out, "{}", render::message_line(message))?;
            }
        }
        Command::Backups { email } => {
            let email = email.as_deref().unwrap_or(account_email);
            let backups = catalog.search_backups(email).await?;
            out.write_all(&backups)?;
        }
        Command::Send { file } => {
            let mime = std::fs::read(&file)
                .with_context(|| format!("reading message from {}", file.display()))?;
            if mime.is_empty() {
                bail!("{} is empty", file.display());
            }
            catalog.send_mail(&mime).await?;
            writeln!(out, "Message sent")?;
        }
    }

    Ok(())
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    let dir = dirs::config_dir().context("no configuration directory on this platform")?;
    Ok(dir.join("mailpilot").join("account.json"))
}
