use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::auth::token::{IssuedToken, TokenSource};
use crate::utils::retry::poll_until;
use crate::Result;

/// Bounded wait for session readiness: 15 probes 300ms apart, about 4.5s.
const READY_ATTEMPTS: u32 = 15;
const READY_DELAY: Duration = Duration::from_millis(300);

/// An authenticated session at the identity provider.
///
/// `is_ready` reports whether the session has finished loading and is
/// present; implementations log their own probe failures and answer
/// `false`. `issue_token` mints a credential from a named template.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    async fn is_ready(&self) -> bool;
    async fn issue_token(&self, template: &str) -> Result<String>;
}

/// Waits out session startup, then mints the first credential.
///
/// Every failure mode collapses to `None`: a session that never becomes
/// ready, a mint that errors, all of it is logged and reported as "no
/// token". Callers defer to the server's own 401 instead of failing hard.
pub struct SessionBootstrap {
    session: Arc<dyn SessionHandle>,
    template: String,
    attempts: u32,
    delay: Duration,
}

impl SessionBootstrap {
    pub fn new(session: Arc<dyn SessionHandle>, template: impl Into<String>) -> Self {
        Self::with_timing(session, template, READY_ATTEMPTS, READY_DELAY)
    }

    /// Custom probe schedule, mainly to keep tests off the 4.5s worst case.
    pub fn with_timing(
        session: Arc<dyn SessionHandle>,
        template: impl Into<String>,
        attempts: u32,
        delay: Duration,
    ) -> Self {
        Self {
            session,
            template: template.into(),
            attempts,
            delay,
        }
    }

    pub async fn bootstrap_token(&self) -> Option<IssuedToken> {
        let session = self.session.clone();
        let outcome = poll_until(self.attempts, self.delay, move || {
            let session = session.clone();
            async move { session.is_ready().await.then_some(()) }
        })
        .await;

        if !outcome.is_ready() {
            warn!(
                attempts = self.attempts,
                "session never became ready, deferring authentication"
            );
            return None;
        }

        match self.session.issue_token(&self.template).await {
            Ok(value) => {
                debug!(template = %self.template, "session issued api token");
                Some(IssuedToken {
                    value,
                    template: self.template.clone(),
                })
            }
            Err(err) => {
                warn!(template = %self.template, error = %err, "token issue failed");
                None
            }
        }
    }
}

#[async_trait]
impl TokenSource for SessionBootstrap {
    async fn fetch_token(&self) -> Option<IssuedToken> {
        self.bootstrap_token().await
    }
}
