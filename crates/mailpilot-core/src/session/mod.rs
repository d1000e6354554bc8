//! Connection ownership for one account.
//!
//! [`SessionManager`] holds the retrieval and submission connections, opens
//! them lazily from the current [`MailSession`] descriptors and throws them
//! away when told to. It never retries anything itself.

pub mod renewal;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Security;
use crate::error::{Error, Result};
use crate::transport::{Connector, RetrievalConnection};

/// Which of the two connections a descriptor is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// IMAP.
    Retrieval,
    /// SMTP.
    Submission,
}

/// Secret used to log in.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Password or app password.
    Password(String),
    /// `OAuth2` access token.
    OAuthToken(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::OAuthToken(_) => f.write_str("OAuthToken(<redacted>)"),
        }
    }
}

/// Where and as whom to connect, without the secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login name.
    pub username: String,
    /// Security mode.
    pub security: Security,
}

impl Endpoint {
    /// Rejects security modes the channel cannot use.
    ///
    /// Retrieval needs implicit TLS; submission may also upgrade with STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedSecurity`] for any other mode.
    pub fn check_security(&self, channel: Channel) -> Result<()> {
        match (channel, self.security) {
            (_, Security::Tls) | (Channel::Submission, Security::StartTls) => Ok(()),
            _ => Err(Error::UnsupportedSecurity),
        }
    }
}

/// Immutable description of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSession {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login name.
    pub username: String,
    /// Secret.
    pub credential: Credential,
    /// Security mode.
    pub security: Security,
}

impl MailSession {
    /// Combines an endpoint with a credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedSecurity`] if the channel cannot use the
    /// endpoint's security mode.
    pub fn new(channel: Channel, endpoint: Endpoint, credential: Credential) -> Result<Self> {
        endpoint.check_security(channel)?;
        Ok(Self {
            host: endpoint.host,
            port: endpoint.port,
            username: endpoint.username,
            credential,
            security: endpoint.security,
        })
    }
}

/// Source of connection settings and the initial credential.
pub trait CredentialProvider: Send + Sync {
    /// Server and login name for a channel.
    fn endpoint(&self, channel: Channel) -> Endpoint;

    /// Credential to start with.
    fn credential(&self) -> Credential;
}

/// Retrieval connection shared between operations.
pub type SharedRetrieval<C> = Arc<Mutex<<C as Connector>::Retrieval>>;

struct ConnectionPair<C: Connector> {
    retrieval_session: MailSession,
    submission_session: MailSession,
    retrieval: Option<SharedRetrieval<C>>,
    submission: Option<Arc<C::Submission>>,
}

/// Owns the connection pair of one account.
pub struct SessionManager<C: Connector> {
    connector: C,
    provider: Box<dyn CredentialProvider>,
    pair: Mutex<ConnectionPair<C>>,
    generation: AtomicU64,
    credential_generation: AtomicU64,
}

impl<C: Connector> SessionManager<C> {
    /// Creates a manager with descriptors built from the provider's credential.
    ///
    /// No connection is opened until first use.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint uses an unsupported security mode.
    pub fn new(connector: C, provider: impl CredentialProvider + 'static) -> Result<Self> {
        let credential = provider.credential();
        let (retrieval_session, submission_session) = build_descriptors(&provider, credential)?;

        Ok(Self {
            connector,
            provider: Box::new(provider),
            pair: Mutex::new(ConnectionPair {
                retrieval_session,
                submission_session,
                retrieval: None,
                submission: None,
            }),
            generation: AtomicU64::new(0),
            credential_generation: AtomicU64::new(0),
        })
    }

    /// Counter bumped whenever the live connections are replaced or dropped.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Counter bumped only when the credential is replaced.
    #[must_use]
    pub fn credential_generation(&self) -> u64 {
        self.credential_generation.load(Ordering::SeqCst)
    }

    /// Retrieval connection, opened on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting or logging in fails.
    pub async fn retrieval(&self) -> Result<SharedRetrieval<C>> {
        let mut pair = self.pair.lock().await;
        if let Some(conn) = &pair.retrieval {
            return Ok(Arc::clone(conn));
        }

        let session = &pair.retrieval_session;
        debug!(host = %session.host, port = session.port, "Opening retrieval connection");
        let conn = Arc::new(Mutex::new(self.connector.connect_retrieval(session).await?));
        pair.retrieval = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Submission connection, opened on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be set up.
    pub async fn submission(&self) -> Result<Arc<C::Submission>> {
        let mut pair = self.pair.lock().await;
        if let Some(conn) = &pair.submission {
            return Ok(Arc::clone(conn));
        }

        let session = &pair.submission_session;
        debug!(host = %session.host, port = session.port, "Opening submission connection");
        let conn = Arc::new(self.connector.connect_submission(session).await?);
        pair.submission = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Rebuilds both descriptors around `credential` and drops the live pair.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint uses an unsupported security mode.
    pub async fn build_session(&self, credential: Credential) -> Result<()> {
        let (retrieval_session, submission_session) =
            build_descriptors(self.provider.as_ref(), credential)?;

        let mut pair = self.pair.lock().await;
        pair.retrieval_session = retrieval_session;
        pair.submission_session = submission_session;
        pair.retrieval = None;
        pair.submission = None;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.credential_generation.fetch_add(1, Ordering::SeqCst);
        info!(generation, "Session rebuilt with new credential");
        Ok(())
    }

    /// Drops both connections without closing them.
    pub async fn discard(&self) {
        let mut pair = self.pair.lock().await;
        pair.retrieval = None;
        pair.submission = None;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "Connections discarded");
    }

    /// Drops both connections, logging out of the retrieval one first.
    ///
    /// The logout outcome is only logged.
    pub async fn teardown(&self) {
        let retrieval = {
            let mut pair = self.pair.lock().await;
            pair.submission = None;
            pair.retrieval.take()
        };
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(conn) = retrieval {
            let mut conn = conn.lock().await;
            match conn.logout().await {
                Ok(()) => debug!("Logged out of retrieval connection"),
                Err(e) => warn!(error = %e, "Logout failed during teardown"),
            }
        }
        info!("Session torn down");
    }
}

fn build_descriptors(
    provider: &dyn CredentialProvider,
    credential: Credential,
) -> Result<(MailSession, MailSession)> {
    let retrieval = MailSession::new(
        Channel::Retrieval,
        provider.endpoint(Channel::Retrieval),
        credential.clone(),
    )?;
    let submission = MailSession::new(
        Channel::Submission,
        provider.endpoint(Channel::Submission),
        credential,
    )?;
    Ok((retrieval, submission))
}
