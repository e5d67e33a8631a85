//! Role permission maps and RBAC maintenance calls.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::auth::permissions::{PermissionFetcher, PermissionSet, RoleEndpoint};
use crate::client::ApiClient;
use crate::Result;

#[async_trait]
impl PermissionFetcher for ApiClient {
    async fn fetch_role(&self, endpoint: RoleEndpoint) -> Result<PermissionSet> {
        let value = self.get(endpoint.path()).await?;
        // Permission payloads arrive bare or under a "data" envelope.
        let payload = match value.get("data") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => value,
        };
        Ok(serde_json::from_value(payload)?)
    }
}

impl ApiClient {
    /// Permission map for a role, served from the session cache after the
    /// first fetch.
    pub async fn permissions_for(&self, role: &str) -> Result<PermissionSet> {
        self.auth().permissions().for_role(role, self).await
    }

    /// Force a fresh permission fetch, dropping whatever is cached.
    ///
    /// The cached credential is dropped with it; the next request mints a
    /// token under the current role assignment.
    pub async fn refresh_permissions(&self, role: &str) -> Result<PermissionSet> {
        let refreshed = self.auth().permissions().refetch(role, self).await;
        self.auth().tokens().clear().await;
        refreshed
    }

    /// Rebuild the backend's RBAC cache and reassign API scopes.
    pub async fn sync_and_assign(&self) -> Result<Value> {
        let result = self.post("/rbac/sync-and-assign-api", json!({})).await?;
        self.auth().audit().rbac_synced();
        Ok(result)
    }
}
