//! SMTP submission through lettre.

use std::borrow::Cow;

use lettre::address::{Address, Envelope};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use mailparse::{MailAddr, MailHeaderMap, addrparse_header, parse_headers};
use tracing::{debug, info};

use super::SubmissionConnection;
use crate::config::Security;
use crate::error::{Error, Result, looks_like_dropped};
use crate::session::{Credential, MailSession};

/// Submission transport for one account.
///
/// lettre pools connections internally; creating one does not touch the network.
pub struct SmtpConnection {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConnection").finish_non_exhaustive()
    }
}

impl SmtpConnection {
    /// Builds the transport from a session descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the security mode is unsupported or the relay
    /// cannot be configured.
    pub fn connect(session: &MailSession) -> Result<Self> {
        let builder = match session.security {
            Security::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&session.host),
            Security::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&session.host)
            }
            Security::None => return Err(Error::UnsupportedSecurity),
        }
        .map_err(|e| Error::Config(format!("SMTP relay {}: {e}", session.host)))?
        .port(session.port);

        let builder = match &session.credential {
            Credential::Password(password) => {
                builder.credentials(Credentials::new(session.username.clone(), password.clone()))
            }
            Credential::OAuthToken(token) => builder
                .credentials(Credentials::new(session.username.clone(), token.clone()))
                .authentication(vec![Mechanism::Xoauth2]),
        };

        debug!(host = %session.host, port = session.port, "SMTP transport configured");
        Ok(Self {
            transport: builder.build(),
        })
    }
}

impl SubmissionConnection for SmtpConnection {
    async fn send(&self, mime: &[u8]) -> Result<()> {
        let (envelope, content) = prepare_submission(mime)?;
        let recipients = envelope.to().len();
        self.transport
            .send_raw(&envelope, &content)
            .await
            .map_err(map_smtp_error)?;
        info!(recipients, "Message submitted");
        Ok(())
    }
}

/// Envelope and the bytes to submit, which carry no `Bcc` field.
fn prepare_submission(mime: &[u8]) -> Result<(Envelope, Cow<'_, [u8]>)> {
    Ok((envelope_from_headers(mime)?, strip_bcc(mime)?))
}

/// Removes every `Bcc` field, folded lines included, from the header block.
fn strip_bcc(mime: &[u8]) -> Result<Cow<'_, [u8]>> {
    let (headers, body_start) =
        parse_headers(mime).map_err(|e| Error::InvalidMessage(format!("headers: {e}")))?;
    if headers.get_first_header("Bcc").is_none() {
        return Ok(Cow::Borrowed(mime));
    }

    let mut kept = Vec::with_capacity(mime.len());
    let mut in_bcc = false;
    for line in mime[..body_start].split_inclusive(|b| *b == b'\n') {
        let folded = matches!(line.first(), Some(b' ' | b'\t'));
        if !folded {
            in_bcc = is_bcc_field(line);
        }
        if !in_bcc {
            kept.extend_from_slice(line);
        }
    }
    kept.extend_from_slice(&mime[body_start..]);
    Ok(Cow::Owned(kept))
}

fn is_bcc_field(line: &[u8]) -> bool {
    line.iter()
        .position(|b| *b == b':')
        .is_some_and(|colon| line[..colon].trim_ascii().eq_ignore_ascii_case(b"bcc"))
}

/// Derives the SMTP envelope from the message's own headers.
///
/// The sender comes from `From`, recipients from `To`, `Cc` and `Bcc`.
pub(crate) fn envelope_from_headers(mime: &[u8]) -> Result<Envelope> {
    let (headers, _) =
        parse_headers(mime).map_err(|e| Error::InvalidMessage(format!("headers: {e}")))?;

    let from_header = headers
        .get_first_header("From")
        .ok_or_else(|| Error::InvalidMessage("missing From header".to_string()))?;
    let from = header_addresses(&from_header)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidMessage("empty From header".to_string()))?;

    let mut to = Vec::new();
    for name in ["To", "Cc", "Bcc"] {
        for header in headers.get_all_headers(name) {
            to.extend(header_addresses(header)?);
        }
    }

    Envelope::new(Some(from), to).map_err(|e| Error::InvalidMessage(e.to_string()))
}

fn header_addresses(header: &mailparse::MailHeader<'_>) -> Result<Vec<Address>> {
    let list = addrparse_header(header)
        .map_err(|e| Error::InvalidMessage(format!("{}: {e}", header.get_key())))?;

    let mut addresses = Vec::new();
    for entry in list.iter() {
        match entry {
            MailAddr::Single(info) => addresses.push(parse_address(&info.addr)?),
            MailAddr::Group(group) => {
                for info in &group.addrs {
                    addresses.push(parse_address(&info.addr)?);
                }
            }
        }
    }
    Ok(addresses)
}

fn parse_address(addr: &str) -> Result<Address> {
    addr.parse()
        .map_err(|e| Error::InvalidMessage(format!("address {addr}: {e}")))
}

fn map_smtp_error(err: lettre::transport::smtp::Error) -> Error {
    let text = err.to_string();
    let code = err.status().map(|code| code.to_string());

    if matches!(code.as_deref(), Some("530" | "534" | "535")) {
        return Error::Authentication(text);
    }
    if err.is_timeout() || looks_like_dropped(&text) {
        return Error::ConnectionDropped(text);
    }
    if err.is_transient() || err.is_permanent() || err.is_client() {
        return Error::Server(text);
    }
    if err.is_response() {
        return Error::MalformedResponse(text);
    }
    Error::ConnectionDropped(text)
}
