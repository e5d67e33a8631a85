use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Entry lifetime applied when `set` is called without one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Cadence of the optional background sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

/// Keyed store with per-entry TTL and lazy eviction.
///
/// An entry is logically absent the moment its TTL elapses: `get` and `has`
/// treat it as a miss and drop it on the spot, so correctness never depends
/// on the sweep. The sweep only bounds memory held by entries nobody
/// re-reads. No size cap or LRU; entries are small JSON payloads with short
/// TTLs. Handles are cheap clones sharing one map.
#[derive(Debug, Clone)]
pub struct TtlCache<T> {
    inner: Arc<Mutex<HashMap<String, CacheEntry<T>>>>,
    default_ttl: Duration,
}

/// Response cache used by the API client, keyed by URL + params.
pub type ApiCache = TtlCache<Value>;

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> TtlCache<T> {
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            default_ttl,
        }
    }

    /// Fetch a live entry, evicting it first if the TTL has elapsed.
    pub async fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut map = self.inner.lock().await;
        match map.get(key) {
            Some(entry) if entry.expired(now) => {
                map.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Store with the default TTL, overwriting any previous entry.
    pub async fn set(&self, key: impl Into<String>, value: T) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let mut map = self.inner.lock().await;
        map.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Liveness check with the same lazy eviction as `get`.
    pub async fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.inner.lock().await;
        match map.get(key) {
            Some(entry) if entry.expired(now) => {
                map.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub async fn remove(&self, key: &str) {
        self.inner.lock().await.remove(key);
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    /// Entry count including not-yet-evicted expired entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut map = self.inner.lock().await;
        let before = map.len();
        map.retain(|_, entry| !entry.expired(now));
        before - map.len()
    }
}

impl<T: Clone + Send + 'static> TtlCache<T> {
    /// Periodic sweep task. The owner holds the handle and aborts it on
    /// teardown; a dropped handle leaks the timer.
    pub fn spawn_sweep(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = cache.sweep().await;
                if removed > 0 {
                    debug!(removed, "evicted expired cache entries");
                }
            }
        })
    }
}

/// Deterministic cache key for a request: parameter names are sorted
/// lexicographically and values JSON-serialized, so logically equal requests
/// key identically no matter the order the caller supplied arguments in.
pub fn cache_key(path: &str, params: &[(&str, Value)]) -> String {
    let mut sorted: Vec<&(&str, Value)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut key = String::from(path);
    for (i, (name, value)) in sorted.iter().enumerate() {
        key.push(if i == 0 { '?' } else { '&' });
        key.push_str(name);
        key.push('=');
        key.push_str(&value.to_string());
    }
    key
}
