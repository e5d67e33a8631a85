use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio::sync::RwLock;
use tracing::debug;

static SCHEME_RE: OnceLock<Regex> = OnceLock::new();

/// A URL is absolute when it carries a scheme, `https://` and friends.
fn has_scheme(url: &str) -> bool {
    let re = SCHEME_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("valid scheme regex"));
    re.is_match(url)
}

/// Trailing-slash-terminated form used for all prefix comparisons. A base
/// stored as `https://api.example.com/` cannot prefix-match an unrelated
/// host like `https://api.example.community`.
fn normalize_base(base: &str) -> String {
    let trimmed = base.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// Destination of an outgoing request, before the HTTP layer resolves it.
#[derive(Debug, Default, Clone)]
pub struct RequestTarget {
    pub url: Option<String>,
    pub base_url: Option<String>,
}

impl RequestTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            base_url: None,
        }
    }

    pub fn with_base(url: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            base_url: Some(base_url.into()),
        }
    }
}

/// Decides which destinations receive the bearer credential.
///
/// First-party API bases are registered at startup; everything else,
/// geocoders and other third parties, must never see a token. Relative
/// URLs are assumed first-party. Handles are cheap clones sharing one
/// registry.
#[derive(Debug, Clone, Default)]
pub struct HeaderPolicy {
    bases: Arc<RwLock<HashSet<String>>>,
}

impl HeaderPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a base URL prefix considered internal. Idempotent.
    pub async fn register_base(&self, base: &str) {
        if base.trim().is_empty() {
            debug!("ignoring empty api base registration");
            return;
        }
        let normalized = normalize_base(base);
        if self.bases.write().await.insert(normalized.clone()) {
            debug!(base = %normalized, "registered api base for auth headers");
        }
    }

    /// Forget every registered base. Used at sign-out.
    pub async fn clear(&self) {
        self.bases.write().await.clear();
    }

    pub async fn base_count(&self) -> usize {
        self.bases.read().await.len()
    }

    /// Whether a raw URL should carry the credential.
    ///
    /// Empty means the request has no destination yet and gets nothing. A
    /// URL without a scheme is relative, so first-party. An absolute URL
    /// qualifies only when prefixed by a registered base.
    pub async fn should_attach_url(&self, url: &str) -> bool {
        if url.is_empty() {
            return false;
        }
        if !has_scheme(url) {
            return true;
        }
        self.bases
            .read()
            .await
            .iter()
            .any(|base| url.starts_with(base))
    }

    /// Whether a request target should carry the credential.
    ///
    /// A relative path configured alongside a base URL is resolved against
    /// that base before testing, one leading slash stripped, so a split
    /// base-plus-path still matches its registered prefix.
    pub async fn should_attach(&self, target: &RequestTarget) -> bool {
        let url = match target.url.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => return false,
        };

        if has_scheme(url) {
            return self.should_attach_url(url).await;
        }

        match target.base_url.as_deref() {
            Some(base) if !base.trim().is_empty() => {
                let resolved = format!(
                    "{}{}",
                    normalize_base(base),
                    url.strip_prefix('/').unwrap_or(url)
                );
                self.should_attach_url(&resolved).await
            }
            _ => true,
        }
    }
}
