//! Thin client for the Ops Board backend REST API.
//!
//! One place attaches credentials and interprets responses; the per-domain
//! modules (`users`, `rbac`, `activity`, `analytics`) only shape payloads
//! and pick endpoints.

pub mod activity;
pub mod analytics;
pub mod rbac;
pub mod users;

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::policy::RequestTarget;
use crate::auth::AuthContext;
use crate::cache::cache_key;
use crate::config::Config;
use crate::{Error, Result};

/// Secondary credential header some backend deployments read instead of
/// the standard bearer header.
pub const JWT_HEADER: &str = "x-jwt-token";

/// Header carrying the identity-provider session id on phone lookups.
pub const SESSION_HEADER: &str = "x-session-id";

/// Per-request correlation id, echoed in server logs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Authenticated REST client for the dashboard backend.
///
/// Every request funnels through [`ApiClient::execute`]: the header policy
/// decides whether to attach the credential, the token cache supplies it,
/// and a 401 response unconditionally drops the cached token so the next
/// call re-bootstraps. Failure to obtain a token never blocks a request;
/// it proceeds unauthenticated and defers to the server's 401.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    auth: AuthContext,
}

impl ApiClient {
    pub fn new(config: &Config, auth: AuthContext) -> Result<Self> {
        let base_url = config.require_api_base()?.trim_end_matches('/').to_string();
        let http = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self {
            http,
            base_url,
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.execute(Method::GET, path, None, &[]).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.execute(Method::POST, path, Some(body), &[]).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Value> {
        self.execute(Method::PATCH, path, Some(body), &[]).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.execute(Method::DELETE, path, None, &[]).await
    }

    /// GET with a response cache in front. The key is deterministic over
    /// path and params, so hits survive param reordering at call sites.
    pub async fn get_cached(
        &self,
        path: &str,
        params: &[(&str, Value)],
        ttl: Duration,
    ) -> Result<Value> {
        let key = cache_key(path, params);
        if let Some(hit) = self.auth.responses().get(&key).await {
            debug!(%key, "api response served from cache");
            return Ok(hit);
        }

        let value = self.execute(Method::GET, &with_query(path, params), None, &[]).await?;
        self.auth
            .responses()
            .set_with_ttl(key, value.clone(), ttl)
            .await;
        Ok(value)
    }

    pub(crate) async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: &[(&str, String)],
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let target = RequestTarget::with_base(path, &self.base_url);
        let request_id = Uuid::new_v4().to_string();

        let mut req = self
            .http
            .request(method.clone(), &url)
            .header(REQUEST_ID_HEADER, &request_id);

        if self.auth.policy().should_attach(&target).await {
            match self.auth.tokens().token().await {
                Some(token) => {
                    req = req
                        .header(AUTHORIZATION, format!("Bearer {token}"))
                        .header(JWT_HEADER, token);
                }
                None => debug!(%url, "no credential available, sending unauthenticated"),
            }
        }

        for (name, value) in extra_headers {
            req = req.header(*name, value);
        }
        if let Some(body) = &body {
            req = req.json(body);
        }

        debug!(method = %method, %url, request_id = %request_id, "api request");
        let resp = req.send().await?;
        let status = resp.status();
        debug!(
            method = %method,
            %url,
            request_id = %request_id,
            status = status.as_u16(),
            "api response"
        );

        if status == StatusCode::UNAUTHORIZED {
            self.auth.tokens().clear().await;
            self.auth.audit().credential_invalidated(&url, &request_id);
            return Err(Error::Unauthorized);
        }

        if !status.is_success() {
            if status == StatusCode::FORBIDDEN {
                self.auth.audit().access_denied(&url, &request_id);
            }
            let body = resp.text().await.unwrap_or_default();
            let err = Error::from_status(status.as_u16(), body);
            warn!(%url, error = %err, "api request failed");
            return Err(err);
        }

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Unwrap the backend's inconsistent list envelopes.
///
/// Compatibility shim: depending on the deployment, list endpoints answer
/// `{"<key>": [...]}`, `{"data": [...]}`, or a bare array. Preference is
/// in that order; anything else is an empty list.
pub fn unwrap_items(value: &Value, key: &str) -> Vec<Value> {
    if let Some(items) = value.get(key).and_then(Value::as_array) {
        return items.clone();
    }
    if let Some(items) = value.get("data").and_then(Value::as_array) {
        return items.clone();
    }
    if let Some(items) = value.as_array() {
        return items.clone();
    }
    Vec::new()
}

fn with_query(path: &str, params: &[(&str, Value)]) -> String {
    let mut out = String::from(path);
    for (i, (name, value)) in params.iter().enumerate() {
        out.push(if i == 0 { '?' } else { '&' });
        out.push_str(name);
        out.push('=');
        match value {
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
    }
    out
}
