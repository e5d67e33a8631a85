use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::{Error, Result};

/// Backend endpoint serving the permission map for a role family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleEndpoint {
    Admin,
    Superadmin,
}

impl RoleEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            RoleEndpoint::Admin => "/rbac/cache/admin",
            RoleEndpoint::Superadmin => "/rbac/cache/superadmin",
        }
    }
}

/// Map a role name to its permission endpoint.
///
/// Matching is case-insensitive and by substring, so "SuperAdmin" and
/// "org:superadmin" both route to the superadmin cache. Anything without
/// an admin marker is rejected before any network traffic happens.
pub fn route_role(role: &str) -> Result<RoleEndpoint> {
    let folded = role.to_ascii_lowercase();
    if folded.contains("superadmin") {
        Ok(RoleEndpoint::Superadmin)
    } else if folded.contains("admin") {
        Ok(RoleEndpoint::Admin)
    } else {
        Err(Error::UnknownRole(role.to_string()))
    }
}

/// Allowed operation identifiers per HTTP method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodPermissions {
    #[serde(rename = "GET", default)]
    pub get: Vec<String>,
    #[serde(rename = "POST", default)]
    pub post: Vec<String>,
    #[serde(rename = "PUT", default)]
    pub put: Vec<String>,
    #[serde(rename = "PATCH", default)]
    pub patch: Vec<String>,
    #[serde(rename = "DELETE", default)]
    pub delete: Vec<String>,
}

/// Allow-list of operations for one role, as served by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub methods: MethodPermissions,
}

impl PermissionSet {
    /// Whether this role may perform `op` over the given HTTP method.
    pub fn allows(&self, method: &Method, op: &str) -> bool {
        let ops = match *method {
            Method::GET => &self.methods.get,
            Method::POST => &self.methods.post,
            Method::PUT => &self.methods.put,
            Method::PATCH => &self.methods.patch,
            Method::DELETE => &self.methods.delete,
            _ => return false,
        };
        ops.iter().any(|allowed| allowed == op)
    }
}

/// Retrieves a permission map from the backend. Implemented by the API
/// client; kept as a seam so the cache is testable without a server.
#[async_trait]
pub trait PermissionFetcher: Send + Sync {
    async fn fetch_role(&self, endpoint: RoleEndpoint) -> Result<PermissionSet>;
}

#[derive(Debug, Clone)]
struct CachedPermissions {
    endpoint: RoleEndpoint,
    set: PermissionSet,
}

/// Session-lifetime cache of the signed-in role's permission map.
///
/// The slot lock is held across the fetch, which is what coalesces the
/// duplicate lookups rapid UI refreshes would otherwise fire: the second
/// caller blocks, then finds the slot populated. A lookup for a role that
/// routes to a different endpoint than the cached one refetches.
#[derive(Clone, Default)]
pub struct PermissionCache {
    slot: Arc<Mutex<Option<CachedPermissions>>>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn for_role(
        &self,
        role: &str,
        fetcher: &dyn PermissionFetcher,
    ) -> Result<PermissionSet> {
        let endpoint = route_role(role)?;

        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.endpoint == endpoint {
                return Ok(cached.set.clone());
            }
            debug!(role, "role changed endpoints, refetching permissions");
        }

        let set = match fetcher.fetch_role(endpoint).await {
            Ok(set) => set,
            Err(err) => {
                error!(role, error = %err, "permission fetch failed");
                return Err(err);
            }
        };

        *slot = Some(CachedPermissions {
            endpoint,
            set: set.clone(),
        });
        debug!(role, endpoint = endpoint.path(), "permissions cached");
        Ok(set)
    }

    /// Drop the cache and fetch anew.
    pub async fn refetch(
        &self,
        role: &str,
        fetcher: &dyn PermissionFetcher,
    ) -> Result<PermissionSet> {
        self.clear().await;
        self.for_role(role, fetcher).await
    }

    /// Read-only peek at whatever is cached, if anything.
    pub async fn current(&self) -> Option<PermissionSet> {
        self.slot.lock().await.as_ref().map(|cached| cached.set.clone())
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }
}
