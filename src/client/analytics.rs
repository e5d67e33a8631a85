//! Dashboard aggregation endpoints: stats, stations, issues, route analytics.

use serde_json::Value;

use crate::cache::DEFAULT_TTL;
use crate::client::{unwrap_items, ApiClient};
use crate::Result;

impl ApiClient {
    /// Headline dashboard numbers. Memoized; these power summary cards
    /// that re-render far more often than the data changes.
    pub async fn dashboard_stats(&self) -> Result<Value> {
        self.get_cached("/dashboard-stats", &[], DEFAULT_TTL).await
    }

    pub async fn stations(&self) -> Result<Vec<Value>> {
        let value = self.get_cached("/stations", &[], DEFAULT_TTL).await?;
        Ok(unwrap_items(&value, "stations"))
    }

    pub async fn user_issues(&self) -> Result<Vec<Value>> {
        let value = self.get_cached("/userissues/all", &[], DEFAULT_TTL).await?;
        Ok(unwrap_items(&value, "issues"))
    }

    pub async fn route_analytics(&self) -> Result<Vec<Value>> {
        let value = self.get_cached("/routes/analytics", &[], DEFAULT_TTL).await?;
        Ok(unwrap_items(&value, "routes"))
    }
}
