use tracing::{info, warn};

/// Structured audit trail for auth-state transitions.
///
/// Events log under the `audit` target so operators can filter them out of
/// regular diagnostics. Entries are keyed by session id and request id, the
/// same correlation fields the backend's activity log records.
#[derive(Debug, Clone, Default)]
pub struct AuditLog;

impl AuditLog {
    pub fn new() -> Self {
        Self
    }

    pub fn sign_in(&self, session_id: &str, template: &str) {
        info!(target: "audit", event = "sign_in", session_id, template);
    }

    pub fn sign_out(&self, session_id: &str) {
        info!(target: "audit", event = "sign_out", session_id);
    }

    pub fn otp_verified(&self, session_id: &str) {
        info!(target: "audit", event = "otp_verified", session_id);
    }

    pub fn session_revoked(&self, session_id: &str) {
        info!(target: "audit", event = "session_revoked", session_id);
    }

    pub fn credential_invalidated(&self, url: &str, request_id: &str) {
        warn!(target: "audit", event = "credential_invalidated", url, request_id);
    }

    pub fn access_denied(&self, url: &str, request_id: &str) {
        warn!(target: "audit", event = "access_denied", url, request_id);
    }

    pub fn rbac_synced(&self) {
        info!(target: "audit", event = "rbac_synced");
    }
}
