//! User CRUD and phone lookup against the dashboard backend.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::{ApiClient, SESSION_HEADER};
use crate::{Error, Result};

static E164_RE: OnceLock<Regex> = OnceLock::new();

/// Normalize a phone number to E.164.
///
/// Separators (spaces, dashes, dots, parentheses) are dropped; what remains
/// must be a `+`, a non-zero digit, and 7 to 14 more digits. Numbers without
/// an explicit country code are rejected rather than guessed at.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let re = E164_RE
        .get_or_init(|| Regex::new(r"^\+[1-9]\d{7,14}$").expect("valid e164 regex"));
    if re.is_match(&compact) {
        Ok(compact)
    } else {
        Err(Error::InvalidPhone(raw.to_string()))
    }
}

/// Payload for creating a dashboard user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl ApiClient {
    pub async fn get_user(&self, user_id: &str) -> Result<Value> {
        self.get(&format!("/users/{user_id}")).await
    }

    /// Phone lookup. Carries the identity session id so the backend can
    /// rate-limit per session before the caller is a full user.
    pub async fn user_exists(&self, phone: &str) -> Result<bool> {
        let phone = normalize_phone(phone)?;

        let mut extra: Vec<(&str, String)> = Vec::new();
        if let Some(session_id) = self.auth().session_id().await {
            extra.push((SESSION_HEADER, session_id));
        }

        let value = self
            .execute(
                Method::POST,
                "/user-exists",
                Some(json!({ "phoneNumber": phone })),
                &extra,
            )
            .await?;

        let exists = value
            .get("exists")
            .or_else(|| value.get("data").and_then(|d| d.get("exists")))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        debug!(%phone, exists, "phone lookup");
        Ok(exists)
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<Value> {
        let mut user = user.clone();
        user.phone_number = normalize_phone(&user.phone_number)?;
        self.post("/users", serde_json::to_value(&user)?).await
    }

    /// Partial update; the patch carries only the fields to change.
    pub async fn update_user(&self, user_id: &str, patch: Value) -> Result<Value> {
        self.patch(&format!("/users/{user_id}"), patch).await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<Value> {
        self.delete(&format!("/users/{user_id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::SessionHandle;
    use crate::auth::AuthContext;
    use crate::config::Config;
    use async_trait::async_trait;
    use mockito::{Matcher, Server};
    use std::sync::Arc;

    #[test]
    fn phones_normalize_to_e164() {
        assert_eq!(normalize_phone("+1 (555) 010-2345").unwrap(), "+15550102345");
        assert_eq!(normalize_phone("+44 20 7946 0958").unwrap(), "+442079460958");

        assert!(matches!(
            normalize_phone("555-0102"),
            Err(Error::InvalidPhone(_))
        ));
        assert!(matches!(
            normalize_phone("+0123456789"),
            Err(Error::InvalidPhone(_))
        ));
        assert!(matches!(normalize_phone(""), Err(Error::InvalidPhone(_))));
    }

    struct ReadySession;

    #[async_trait]
    impl SessionHandle for ReadySession {
        async fn is_ready(&self) -> bool {
            true
        }

        async fn issue_token(&self, template: &str) -> Result<String> {
            Ok(format!("jwt-{template}"))
        }
    }

    async fn signed_in_client(server: &Server) -> ApiClient {
        let config = Config {
            api_base_url: Some(server.url()),
            ..Config::default()
        };
        let auth = AuthContext::init(&config).await;
        auth.sign_in("sess_42", Arc::new(ReadySession), "ops-api")
            .await;
        ApiClient::new(&config, auth).unwrap()
    }

    #[tokio::test]
    async fn user_exists_carries_session_header_and_normalized_phone() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/user-exists")
            .match_header(SESSION_HEADER, Matcher::Exact("sess_42".into()))
            .match_body(Matcher::Json(json!({ "phoneNumber": "+15550102345" })))
            .with_status(200)
            .with_body(r#"{"exists": true}"#)
            .create_async()
            .await;

        let client = signed_in_client(&server).await;
        assert!(client.user_exists("+1 555 010 2345").await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn invalid_phone_never_reaches_the_network() {
        let server = Server::new_async().await;
        let client = signed_in_client(&server).await;

        assert!(matches!(
            client.user_exists("not-a-phone").await,
            Err(Error::InvalidPhone(_))
        ));
    }

    #[tokio::test]
    async fn create_user_posts_camel_case_payload() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/users")
            .match_body(Matcher::Json(json!({
                "phoneNumber": "+15550102345",
                "firstName": "Ada",
                "lastName": "Byron",
                "role": "admin"
            })))
            .with_status(200)
            .with_body(r#"{"id": "u_1"}"#)
            .create_async()
            .await;

        let client = signed_in_client(&server).await;
        let created = client
            .create_user(&NewUser {
                phone_number: "+1 555 010 2345".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Byron".to_string(),
                role: "admin".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(created["id"], "u_1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn update_and_delete_hit_the_user_path() {
        let mut server = Server::new_async().await;
        let patch_mock = server
            .mock("PATCH", "/users/u_1")
            .match_body(Matcher::Json(json!({ "role": "superadmin" })))
            .with_status(200)
            .with_body(r#"{"id": "u_1", "role": "superadmin"}"#)
            .create_async()
            .await;
        let delete_mock = server
            .mock("DELETE", "/users/u_1")
            .with_status(204)
            .create_async()
            .await;

        let client = signed_in_client(&server).await;
        let updated = client
            .update_user("u_1", json!({ "role": "superadmin" }))
            .await
            .unwrap();
        assert_eq!(updated["role"], "superadmin");

        client.delete_user("u_1").await.unwrap();
        patch_mock.assert_async().await;
        delete_mock.assert_async().await;
    }
}
