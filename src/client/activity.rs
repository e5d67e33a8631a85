//! Activity-log feed: lazy pagination plus a periodic refresh task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::{unwrap_items, ApiClient};
use crate::Result;

/// Activity responses are memoized briefly; the refresh loop's interval
/// sits just past this, so each tick reaches the backend.
pub const ACTIVITY_TTL: Duration = Duration::from_secs(30);

/// Base cadence of the background feed refresh, before jitter.
pub const FEED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// One fetched page and the backend's signal for whether more exist.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

/// Supplies pages to a [`FeedLoader`]. Implemented by the API client for
/// activity logs; tests script their own.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch_page(&self, page: u32, limit: u32) -> Result<Page<T>>;
}

/// Fetch-and-append pagination state machine.
///
/// `load_more` is a guarded no-op while a fetch is in flight or once the
/// feed is exhausted. A failed fetch records the error and leaves items and
/// the page counter untouched, so the same page can be retried. `reset`
/// returns to the idle state from anywhere, including a loader whose fetch
/// was cancelled mid-flight.
pub struct FeedLoader<T> {
    fetcher: Arc<dyn PageFetcher<T>>,
    limit: u32,
    items: Vec<T>,
    page: u32,
    is_fetching: bool,
    has_more: bool,
    error: Option<String>,
}

impl<T> FeedLoader<T> {
    pub fn new(fetcher: Arc<dyn PageFetcher<T>>, limit: u32) -> Self {
        Self {
            fetcher,
            limit,
            items: Vec::new(),
            page: 1,
            is_fetching: false,
            has_more: true,
            error: None,
        }
    }

    /// Start over: drop items and errors, fetch page 1.
    pub async fn load_initial(&mut self) -> bool {
        self.reset();
        self.load_more().await
    }

    /// Fetch the next page and append it. Returns whether items were
    /// appended; inspect [`FeedLoader::error`] to tell a failed fetch from
    /// an exhausted feed.
    pub async fn load_more(&mut self) -> bool {
        if self.is_fetching || !self.has_more {
            return false;
        }

        self.is_fetching = true;
        let outcome = self.fetcher.fetch_page(self.page, self.limit).await;
        self.is_fetching = false;

        match outcome {
            Ok(fetched) => {
                let appended = !fetched.items.is_empty();
                self.items.extend(fetched.items);
                self.has_more = fetched.has_more;
                self.page += 1;
                self.error = None;
                appended
            }
            Err(err) => {
                warn!(page = self.page, error = %err, "feed page fetch failed");
                self.error = Some(err.to_string());
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.items.clear();
        self.page = 1;
        self.is_fetching = false;
        self.has_more = true;
        self.error = None;
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_fetching(&self) -> bool {
        self.is_fetching
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[async_trait]
impl PageFetcher<Value> for ApiClient {
    async fn fetch_page(&self, page: u32, limit: u32) -> Result<Page<Value>> {
        self.activity_page(page, limit).await
    }
}

impl ApiClient {
    /// One page of activity logs, memoized for [`ACTIVITY_TTL`].
    ///
    /// "More pages exist" is whatever signal the backend offers: an explicit
    /// `hasMore` flag, a total `count` to compare against, or, failing both,
    /// a full page.
    pub async fn activity_page(&self, page: u32, limit: u32) -> Result<Page<Value>> {
        let params = [("limit", json!(limit)), ("page", json!(page))];
        let value = self
            .get_cached("/activitylogs", &params, ACTIVITY_TTL)
            .await?;

        let items = unwrap_items(&value, "logs");
        let has_more = match (
            value.get("hasMore").and_then(Value::as_bool),
            value.get("count").and_then(Value::as_u64),
        ) {
            (Some(flag), _) => flag,
            (None, Some(count)) => u64::from(page) * u64::from(limit) < count,
            (None, None) => limit > 0 && items.len() as u64 == u64::from(limit),
        };

        Ok(Page { items, has_more })
    }

    /// Loader over the activity feed, `limit` entries per page.
    pub fn activity_feed(&self, limit: u32) -> FeedLoader<Value> {
        FeedLoader::new(Arc::new(self.clone()), limit)
    }
}

/// Periodically re-fetch the first feed page and broadcast it.
///
/// Jitter keeps a fleet of clients from thundering in step. The caller owns
/// the handle and aborts it on teardown.
pub fn spawn_feed_refresh(
    client: ApiClient,
    limit: u32,
    interval: Duration,
) -> (JoinHandle<()>, broadcast::Receiver<Vec<Value>>) {
    let (tx, rx) = broadcast::channel(8);
    let handle = tokio::spawn(async move {
        loop {
            let jitter_ms = {
                use rand::Rng;
                let cap = (interval.as_millis() / 4) as u64;
                rand::thread_rng().gen_range(0..=cap)
            };
            tokio::time::sleep(interval + Duration::from_millis(jitter_ms)).await;

            match client.activity_page(1, limit).await {
                Ok(page) => {
                    debug!(count = page.items.len(), "activity feed refreshed");
                    // No receivers is fine; the next tick tries again.
                    let _ = tx.send(page.items);
                }
                Err(err) => {
                    warn!(error = %err, "activity refresh failed (will retry)");
                }
            }
        }
    });
    (handle, rx)
}
