//! Identity-provider client: phone OTP sign-in, session lifecycle, and
//! templated token minting.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::audit::AuditLog;
use crate::auth::session::SessionHandle;
use crate::client::users::normalize_phone;
use crate::config::Config;
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct OtpStartResponse {
    challenge_id: String,
}

/// Verified identity session, as returned by the OTP verify step.
#[derive(Debug, Clone, Deserialize)]
pub struct IdpSession {
    pub session_id: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionStatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    jwt: String,
}

/// Client for the identity provider's REST surface.
///
/// The IdP manages its own credentials per call, so nothing here goes
/// through the dashboard token cache or header policy.
#[derive(Debug, Clone)]
pub struct IdpClient {
    base_url: String,
    http: Client,
    audit: AuditLog,
}

impl IdpClient {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config.require_idp_base()?.trim_end_matches('/').to_string();
        let http = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self {
            base_url,
            http,
            audit: AuditLog::new(),
        })
    }

    /// Begin a phone OTP challenge. Returns the challenge id the verify
    /// step needs.
    pub async fn start_otp(&self, phone: &str) -> Result<String> {
        let phone = normalize_phone(phone)?;
        let url = format!("{}/v1/otp/start", self.base_url);

        let resp = self
            .http
            .post(&url)
            .json(&json!({ "phone_number": phone }))
            .send()
            .await?;
        let resp = check(resp).await?;

        let started: OtpStartResponse = resp.json().await?;
        debug!(%phone, challenge_id = %started.challenge_id, "otp challenge started");
        Ok(started.challenge_id)
    }

    /// Trade an OTP code for a session.
    pub async fn verify_otp(&self, challenge_id: &str, code: &str) -> Result<IdpSession> {
        let url = format!("{}/v1/otp/verify", self.base_url);

        let resp = self
            .http
            .post(&url)
            .json(&json!({ "challenge_id": challenge_id, "code": code }))
            .send()
            .await?;
        let resp = check(resp).await?;

        let session: IdpSession = resp.json().await?;
        self.audit.otp_verified(&session.session_id);
        Ok(session)
    }

    /// Current lifecycle status of a session ("pending", "active", ...).
    pub async fn session_status(&self, session_id: &str) -> Result<String> {
        let url = format!("{}/v1/sessions/{session_id}", self.base_url);
        let resp = self.http.get(&url).send().await?;
        let resp = check(resp).await?;

        let status: SessionStatusResponse = resp.json().await?;
        Ok(status.status)
    }

    /// Mint a JWT from the named template against an active session.
    pub async fn issue_token(&self, session_id: &str, template: &str) -> Result<String> {
        let url = format!("{}/v1/sessions/{session_id}/tokens/{template}", self.base_url);
        let resp = self.http.post(&url).send().await?;
        let resp = check(resp).await?;

        let token: TokenResponse = resp.json().await?;
        Ok(token.jwt)
    }

    /// Revoke a session. Already-gone sessions are not an error.
    pub async fn sign_out(&self, session_id: &str) -> Result<()> {
        let url = format!("{}/v1/sessions/{session_id}", self.base_url);
        let resp = self.http.delete(&url).send().await?;

        let status = resp.status();
        if !status.is_success() && status.as_u16() != 404 {
            let body = resp.text().await.unwrap_or_default();
            warn!(session_id, status = status.as_u16(), body = %body, "session revoke returned an error");
            return Err(Error::from_status(status.as_u16(), body));
        }

        self.audit.session_revoked(session_id);
        Ok(())
    }

    /// Wrap a session id as a [`SessionHandle`] for the token bootstrap.
    pub fn session_handle(&self, session_id: impl Into<String>) -> IdpSessionHandle {
        IdpSessionHandle {
            client: self.clone(),
            session_id: session_id.into(),
        }
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::from_status(status.as_u16(), body))
}

/// A live IdP session, seen through the bootstrap's eyes.
#[derive(Debug, Clone)]
pub struct IdpSessionHandle {
    client: IdpClient,
    session_id: String,
}

#[async_trait]
impl SessionHandle for IdpSessionHandle {
    async fn is_ready(&self) -> bool {
        match self.client.session_status(&self.session_id).await {
            Ok(status) => status == "active",
            Err(err) => {
                debug!(session_id = %self.session_id, error = %err, "session probe failed");
                false
            }
        }
    }

    async fn issue_token(&self, template: &str) -> Result<String> {
        self.client.issue_token(&self.session_id, template).await
    }
}
