pub mod audit;
pub mod permissions;
pub mod policy;
pub mod session;
pub mod token;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{ApiCache, SWEEP_INTERVAL};
use crate::config::Config;
use audit::AuditLog;
use permissions::PermissionCache;
use policy::HeaderPolicy;
use session::{SessionBootstrap, SessionHandle};
use token::TokenCache;

/// Owns every piece of per-session auth state: token cache, header policy,
/// permission cache, response cache, and the current session id.
///
/// One context is built at startup and handed to whoever needs it; tests
/// build isolated ones. `teardown` puts it back to the signed-out state and
/// stops the background sweep.
#[derive(Clone)]
pub struct AuthContext {
    tokens: TokenCache,
    policy: HeaderPolicy,
    permissions: PermissionCache,
    responses: ApiCache,
    audit: AuditLog,
    session_id: Arc<RwLock<Option<String>>>,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AuthContext {
    /// Build a signed-out context, register the configured API base with
    /// the header policy, and start the response-cache sweep.
    pub async fn init(config: &Config) -> Self {
        let ctx = Self {
            tokens: TokenCache::new(),
            policy: HeaderPolicy::new(),
            permissions: PermissionCache::new(),
            responses: ApiCache::new(),
            audit: AuditLog::new(),
            session_id: Arc::new(RwLock::new(None)),
            sweeper: Arc::new(Mutex::new(None)),
        };

        match config.require_api_base() {
            Ok(base) => ctx.policy.register_base(base).await,
            Err(_) => debug!("no api base configured, header policy starts empty"),
        }

        let handle = ctx.responses.spawn_sweep(SWEEP_INTERVAL);
        *ctx.sweeper.lock().await = Some(handle);

        ctx
    }

    /// Bind an authenticated identity session. Tokens minted from here on
    /// come from this session via the bootstrap retry loop.
    pub async fn sign_in(
        &self,
        session_id: impl Into<String>,
        session: Arc<dyn SessionHandle>,
        template: &str,
    ) {
        let session_id = session_id.into();
        let bootstrap = SessionBootstrap::new(session, template);
        self.tokens.set_source(Arc::new(bootstrap)).await;
        *self.session_id.write().await = Some(session_id.clone());
        self.audit.sign_in(&session_id, template);
    }

    /// Return to the signed-out state: drop credentials, permissions,
    /// cached responses, registered bases, and stop the sweep task.
    /// The sign-out audit event fires only for a session that was bound.
    pub async fn teardown(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }

        let session_id = self.session_id.write().await.take();
        self.tokens.clear().await;
        self.tokens.clear_source().await;
        self.permissions.clear().await;
        self.responses.clear().await;
        self.policy.clear().await;

        if let Some(session_id) = session_id.as_deref() {
            self.audit.sign_out(session_id);
        }
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    pub fn policy(&self) -> &HeaderPolicy {
        &self.policy
    }

    pub fn permissions(&self) -> &PermissionCache {
        &self.permissions
    }

    pub fn responses(&self) -> &ApiCache {
        &self.responses
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::{IssuedToken, TokenSource};
    use async_trait::async_trait;

    struct StaticSession;

    #[async_trait]
    impl SessionHandle for StaticSession {
        async fn is_ready(&self) -> bool {
            true
        }

        async fn issue_token(&self, template: &str) -> crate::Result<String> {
            Ok(format!("jwt-{template}"))
        }
    }

    fn test_config() -> Config {
        Config {
            api_base_url: Some("https://api.example.com".to_string()),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn init_registers_configured_base() {
        let ctx = AuthContext::init(&test_config()).await;

        assert!(
            ctx.policy()
                .should_attach_url("https://api.example.com/users/1")
                .await
        );
        ctx.teardown().await;
    }

    #[tokio::test]
    async fn sign_in_binds_a_token_source() {
        let ctx = AuthContext::init(&test_config()).await;

        ctx.sign_in("sess_1", Arc::new(StaticSession), "ops-api")
            .await;
        assert_eq!(ctx.session_id().await.as_deref(), Some("sess_1"));
        assert_eq!(ctx.tokens().token().await.as_deref(), Some("jwt-ops-api"));

        ctx.teardown().await;
        assert_eq!(ctx.session_id().await, None);
        assert_eq!(ctx.tokens().token().await, None);
        assert_eq!(ctx.policy().base_count().await, 0);
    }

    struct NullSource;

    #[async_trait]
    impl TokenSource for NullSource {
        async fn fetch_token(&self) -> Option<IssuedToken> {
            None
        }
    }

    #[tokio::test]
    async fn teardown_clears_cached_state() {
        let ctx = AuthContext::init(&test_config()).await;

        ctx.tokens().set_source(Arc::new(NullSource)).await;
        ctx.responses()
            .set("users/1".to_string(), serde_json::json!({"id": 1}))
            .await;
        assert_eq!(ctx.responses().len().await, 1);

        ctx.teardown().await;
        assert_eq!(ctx.responses().len().await, 0);
    }

    /// Counts events emitted under the `audit` target on this thread.
    #[derive(Clone, Default)]
    struct AuditTap(Arc<std::sync::Mutex<usize>>);

    impl AuditTap {
        fn count(&self) -> usize {
            *self.0.lock().unwrap()
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for AuditTap {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if event.metadata().target() == "audit" {
                *self.0.lock().unwrap() += 1;
            }
        }
    }

    #[tokio::test]
    async fn sign_out_event_requires_a_bound_session() {
        use tracing_subscriber::layer::SubscriberExt;

        let tap = AuditTap::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(tap.clone()));

        let idle = AuthContext::init(&test_config()).await;
        idle.teardown().await;
        assert_eq!(tap.count(), 0);

        let ctx = AuthContext::init(&test_config()).await;
        ctx.sign_in("sess_1", Arc::new(StaticSession), "ops-api")
            .await;
        ctx.teardown().await;
        assert_eq!(tap.count(), 2);
    }
}
