use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Issued tokens are valid for one hour from mint time.
const TOKEN_LIFETIME_SECS: i64 = 60 * 60;

/// A token this close to expiry is treated as already expired, so a fresh
/// one is minted before the old one can lapse mid-request.
const REFRESH_BUFFER_SECS: i64 = 5 * 60;

/// A short-lived API token minted from a named template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub template: String,
}

/// Anything that can mint a fresh token, typically a live identity session.
///
/// Implementations log their own failures and report them as `None`; the
/// cache never sees an error, only the absence of a token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Option<IssuedToken>;
}

#[derive(Debug, Clone)]
struct CachedCredential {
    token: String,
    template: String,
    expires_at: DateTime<Utc>,
}

/// Single-slot token cache with atomic swap, shared across request paths.
///
/// Cache misses go straight to the bound [`TokenSource`]. Concurrent cold
/// callers are not coalesced: each performs its own fetch and the last
/// writer wins the slot.
#[derive(Clone)]
pub struct TokenCache {
    slot: Arc<RwLock<Option<CachedCredential>>>,
    source: Arc<RwLock<Option<Arc<dyn TokenSource>>>>,
    lifetime: Duration,
    refresh_buffer: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_lifetimes(
            Duration::seconds(TOKEN_LIFETIME_SECS),
            Duration::seconds(REFRESH_BUFFER_SECS),
        )
    }

    /// Custom lifetime and refresh buffer, mainly for exercising expiry in
    /// tests without waiting out the real one-hour window.
    pub fn with_lifetimes(lifetime: Duration, refresh_buffer: Duration) -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
            source: Arc::new(RwLock::new(None)),
            lifetime,
            refresh_buffer,
        }
    }

    /// Bind the session that mints tokens on cache misses.
    pub async fn set_source(&self, source: Arc<dyn TokenSource>) {
        *self.source.write().await = Some(source);
    }

    pub async fn clear_source(&self) {
        *self.source.write().await = None;
    }

    /// Current token, minting a fresh one if the slot is empty or stale.
    ///
    /// Returns `None` when no session is bound or the mint fails; callers
    /// then send the request unauthenticated and let the server reject it.
    pub async fn token(&self) -> Option<String> {
        if let Some(live) = self.cached().await {
            return Some(live);
        }

        let source = self.source.read().await.clone();
        let source = match source {
            Some(source) => source,
            None => {
                debug!("no session bound, skipping token mint");
                return None;
            }
        };

        // The slot lock is not held across the fetch.
        let issued = match source.fetch_token().await {
            Some(issued) => issued,
            None => {
                warn!("token mint failed, request will go out unauthenticated");
                return None;
            }
        };

        let expires_at = Utc::now() + self.lifetime;
        let mut slot = self.slot.write().await;
        *slot = Some(CachedCredential {
            token: issued.value.clone(),
            template: issued.template.clone(),
            expires_at,
        });
        debug!(template = %issued.template, %expires_at, "minted fresh api token");

        Some(issued.value)
    }

    /// Cached token if present and outside the refresh buffer.
    pub async fn cached(&self) -> Option<String> {
        let slot = self.slot.read().await;
        match slot.as_ref() {
            Some(entry) if Utc::now() + self.refresh_buffer < entry.expires_at => {
                Some(entry.token.clone())
            }
            _ => None,
        }
    }

    /// Expiry of the cached token, stale or not. Diagnostic only.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.slot.read().await.as_ref().map(|entry| entry.expires_at)
    }

    /// Template the cached token was minted from.
    pub async fn template(&self) -> Option<String> {
        self.slot
            .read()
            .await
            .as_ref()
            .map(|entry| entry.template.clone())
    }

    /// Drop the cached token. The next `token()` call mints a fresh one.
    pub async fn clear(&self) {
        let mut slot = self.slot.write().await;
        if slot.take().is_some() {
            debug!("cached api token dropped");
        }
    }
}
