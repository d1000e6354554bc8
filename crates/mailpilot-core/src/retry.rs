//! One remediation cycle per failed operation.
//!
//! [`RetryCoordinator::run`] invokes an action, classifies a failure, fixes
//! the session once (token renewal or reconnect) and invokes the retry. The
//! class of the last failure of every operation name is remembered; a second
//! failure of the same class with no success in between is returned without
//! remediation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{ClassifiedError, Result};
use crate::session::SessionManager;
use crate::session::renewal::TokenRenewalService;
use crate::transport::Connector;

/// Runs operations with classification and single-shot remediation.
pub struct RetryCoordinator<C: Connector, R> {
    sessions: Arc<SessionManager<C>>,
    renewal: R,
    last_errors: Mutex<HashMap<String, ClassifiedError>>,
    remediation: tokio::sync::Mutex<()>,
}

impl<C: Connector, R: TokenRenewalService> RetryCoordinator<C, R> {
    /// Creates a coordinator for one account.
    pub fn new(sessions: Arc<SessionManager<C>>, renewal: R) -> Self {
        Self {
            sessions,
            renewal,
            last_errors: Mutex::new(HashMap::new()),
            remediation: tokio::sync::Mutex::new(()),
        }
    }

    /// Session manager the coordinator remediates.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionManager<C>> {
        &self.sessions
    }

    /// Class of the last unresolved failure of an operation, if any.
    #[must_use]
    pub fn last_error(&self, name: &str) -> Option<ClassifiedError> {
        self.errors().get(name).cloned()
    }

    /// Runs `action`, remediating and calling `retry` at most once.
    ///
    /// # Errors
    ///
    /// Returns the action's error when it is not retryable or repeats the
    /// previous failure class, a renewal or rebuild error, or the retry's error.
    pub async fn run<T, A, AF, B, BF>(&self, name: &str, action: A, retry: B) -> Result<T>
    where
        A: FnOnce() -> AF,
        AF: Future<Output = Result<T>>,
        B: FnOnce() -> BF,
        BF: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let seen = Generations::of(&self.sessions);

        let err = match action().await {
            Ok(value) => {
                self.clear(name);
                debug!(operation = name, elapsed_ms = elapsed_ms(started), "Operation succeeded");
                return Ok(value);
            }
            Err(e) => e,
        };

        let class = err.classify();
        let repeated = {
            let mut errors = self.errors();
            if errors.get(name) == Some(&class) {
                true
            } else {
                errors.insert(name.to_string(), class.clone());
                false
            }
        };

        if repeated {
            warn!(operation = name, error = %err, "Same failure as last time, not remediating");
            return Err(err);
        }
        if !class.is_retryable() {
            debug!(operation = name, error = %err, elapsed_ms = elapsed_ms(started), "Operation failed");
            return Err(err);
        }

        self.remediate(name, &class, seen).await?;

        let outcome = retry().await;
        match &outcome {
            Ok(_) => {
                self.clear(name);
                info!(operation = name, elapsed_ms = elapsed_ms(started), "Retry succeeded");
            }
            Err(e) => {
                warn!(operation = name, error = %e, elapsed_ms = elapsed_ms(started), "Retry failed");
            }
        }
        outcome
    }

    /// Clears the error memory after tearing the session down.
    pub async fn teardown(&self) {
        self.sessions.teardown().await;
        self.errors().clear();
    }

    async fn remediate(&self, name: &str, class: &ClassifiedError, seen: Generations) -> Result<()> {
        let _guard = self.remediation.lock().await;
        let now = Generations::of(&self.sessions);

        match class {
            ClassifiedError::Authentication if now.credential != seen.credential => {
                debug!(operation = name, "Credential already renewed, retrying directly");
                Ok(())
            }
            ClassifiedError::ConnectionDropped if now.connections != seen.connections => {
                debug!(operation = name, "Connections already replaced, retrying directly");
                Ok(())
            }
            ClassifiedError::Authentication => {
                info!(operation = name, "Credentials rejected, renewing");
                let credential = self.renewal.renew().await?;
                self.sessions.build_session(credential).await
            }
            ClassifiedError::ConnectionDropped => {
                info!(operation = name, "Connection dropped, reconnecting");
                self.sessions.discard().await;
                Ok(())
            }
            ClassifiedError::Other(_) => Ok(()),
        }
    }

    fn clear(&self, name: &str) {
        self.errors().remove(name);
    }

    fn errors(&self) -> std::sync::MutexGuard<'_, HashMap<String, ClassifiedError>> {
        self.last_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Session counters observed when an action started.
#[derive(Debug, Clone, Copy)]
struct Generations {
    connections: u64,
    credential: u64,
}

impl Generations {
    fn of<C: Connector>(sessions: &SessionManager<C>) -> Self {
        Self {
            connections: sessions.generation(),
            credential: sessions.credential_generation(),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
