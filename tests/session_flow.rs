use std::sync::Arc;

use async_trait::async_trait;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

use opsboard::auth::token::{IssuedToken, TokenSource};
use opsboard::auth::AuthContext;
use opsboard::client::{ApiClient, JWT_HEADER, SESSION_HEADER};
use opsboard::config::Config;
use opsboard::geocode::Geocoder;
use opsboard::idp::IdpClient;
use opsboard::Error;

fn config_for(api: &ServerGuard, idp: Option<&ServerGuard>) -> Config {
    Config {
        api_base_url: Some(api.url()),
        idp_base_url: idp.map(|s| s.url()),
        ..Config::default()
    }
}

/// Mock an IdP session that reports active and mints the given token.
async fn mock_idp_session(idp: &mut ServerGuard, session_id: &str, jwt: &str) {
    idp.mock("GET", format!("/v1/sessions/{session_id}").as_str())
        .with_status(200)
        .with_body(r#"{"status": "active"}"#)
        .expect_at_least(1)
        .create_async()
        .await;
    idp.mock(
        "POST",
        format!("/v1/sessions/{session_id}/tokens/ops-api").as_str(),
    )
    .with_status(200)
    .with_body(json!({ "jwt": jwt }).to_string())
    .expect_at_least(1)
    .create_async()
    .await;
}

async fn signed_in_stack(
    api: &ServerGuard,
    idp: &ServerGuard,
    session_id: &str,
) -> (AuthContext, ApiClient) {
    let config = config_for(api, Some(idp));
    let ctx = AuthContext::init(&config).await;
    let idp_client = IdpClient::new(&config).unwrap();
    ctx.sign_in(
        session_id,
        Arc::new(idp_client.session_handle(session_id)),
        "ops-api",
    )
    .await;
    let client = ApiClient::new(&config, ctx.clone()).unwrap();
    (ctx, client)
}

#[tokio::test]
async fn signed_in_requests_carry_both_credential_headers() {
    let mut api = Server::new_async().await;
    let mut idp = Server::new_async().await;
    mock_idp_session(&mut idp, "sess_1", "jwt-1").await;

    let user_mock = api
        .mock("GET", "/users/123")
        .match_header("Authorization", Matcher::Exact("Bearer jwt-1".into()))
        .match_header(JWT_HEADER, Matcher::Exact("jwt-1".into()))
        .with_status(200)
        .with_body(r#"{"id": 123, "firstName": "Ada"}"#)
        .create_async()
        .await;

    let (_ctx, client) = signed_in_stack(&api, &idp, "sess_1").await;
    let user = client.get_user("123").await.unwrap();
    assert_eq!(user["firstName"], "Ada");
    user_mock.assert_async().await;
}

#[tokio::test]
async fn phone_lookup_carries_the_session_header() {
    let mut api = Server::new_async().await;
    let mut idp = Server::new_async().await;
    mock_idp_session(&mut idp, "sess_7", "jwt-7").await;

    let lookup = api
        .mock("POST", "/user-exists")
        .match_header(SESSION_HEADER, Matcher::Exact("sess_7".into()))
        .match_header("Authorization", Matcher::Exact("Bearer jwt-7".into()))
        .match_body(Matcher::Json(json!({ "phoneNumber": "+15550102345" })))
        .with_status(200)
        .with_body(r#"{"exists": false}"#)
        .create_async()
        .await;

    let (_ctx, client) = signed_in_stack(&api, &idp, "sess_7").await;
    assert!(!client.user_exists("+1 (555) 010-2345").await.unwrap());
    lookup.assert_async().await;
}

/// Mints the token the backend has already invalidated.
struct StaleMint;

#[async_trait]
impl TokenSource for StaleMint {
    async fn fetch_token(&self) -> Option<IssuedToken> {
        Some(IssuedToken {
            value: "jwt-stale".into(),
            template: "ops-api".into(),
        })
    }
}

// Full re-auth loop: a 401 drops the cached credential and the next
// request re-runs the session bootstrap on its own, with no rebinding
// in between.
#[tokio::test]
async fn rejected_credential_recovers_on_the_next_request() {
    let mut api = Server::new_async().await;
    let mut idp = Server::new_async().await;
    mock_idp_session(&mut idp, "sess_1", "jwt-fresh").await;

    let unauthorized = api
        .mock("GET", "/users/123")
        .match_header("Authorization", Matcher::Exact("Bearer jwt-stale".into()))
        .with_status(401)
        .with_body(r#"{"error": "token expired"}"#)
        .expect(1)
        .create_async()
        .await;
    let recovered = api
        .mock("GET", "/users/123")
        .match_header("Authorization", Matcher::Exact("Bearer jwt-fresh".into()))
        .match_header(JWT_HEADER, Matcher::Exact("jwt-fresh".into()))
        .with_status(200)
        .with_body(r#"{"id": 123}"#)
        .expect(1)
        .create_async()
        .await;

    let config = config_for(&api, Some(&idp));
    let ctx = AuthContext::init(&config).await;

    // A token from an earlier run is still cached when the session binds.
    ctx.tokens().set_source(Arc::new(StaleMint)).await;
    ctx.tokens().token().await;
    let idp_client = IdpClient::new(&config).unwrap();
    ctx.sign_in(
        "sess_1",
        Arc::new(idp_client.session_handle("sess_1")),
        "ops-api",
    )
    .await;

    let client = ApiClient::new(&config, ctx.clone()).unwrap();
    let err = client.get_user("123").await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized));
    assert!(ctx.tokens().cached().await.is_none());

    let user = client.get_user("123").await.unwrap();
    assert_eq!(user["id"], 123);
    unauthorized.assert_async().await;
    recovered.assert_async().await;
}

#[tokio::test]
async fn concurrent_permission_lookups_share_one_fetch() {
    let mut api = Server::new_async().await;
    let rbac = api
        .mock("GET", "/rbac/cache/admin")
        .with_status(200)
        .with_body(r#"{"role": "admin", "methods": {"GET": ["users"]}}"#)
        .expect(1)
        .create_async()
        .await;

    let config = config_for(&api, None);
    let ctx = AuthContext::init(&config).await;
    let client = ApiClient::new(&config, ctx).unwrap();

    let (a, b) = tokio::join!(
        client.permissions_for("admin"),
        client.permissions_for("Admin")
    );
    assert_eq!(a.unwrap(), b.unwrap());
    rbac.assert_async().await;
}

#[tokio::test]
async fn feed_pages_append_until_the_count_is_reached() {
    let mut api = Server::new_async().await;
    let page_one = api
        .mock("GET", "/activitylogs?limit=2&page=1")
        .with_status(200)
        .with_body(r#"{"data": [{"id": 1}, {"id": 2}], "count": 3}"#)
        .expect(1)
        .create_async()
        .await;
    let page_two = api
        .mock("GET", "/activitylogs?limit=2&page=2")
        .with_status(200)
        .with_body(r#"{"data": [{"id": 3}], "count": 3}"#)
        .expect(1)
        .create_async()
        .await;

    let config = config_for(&api, None);
    let ctx = AuthContext::init(&config).await;
    let client = ApiClient::new(&config, ctx).unwrap();

    let mut loader = client.activity_feed(2);
    assert!(loader.load_initial().await);
    assert!(loader.has_more());
    assert!(loader.load_more().await);
    assert!(!loader.has_more());
    assert_eq!(loader.items().len(), 3);

    // Exhausted: a further call fetches nothing.
    assert!(!loader.load_more().await);
    page_one.assert_async().await;
    page_two.assert_async().await;
}

#[tokio::test]
async fn geocoder_requests_stay_unauthenticated() {
    let mut geo = Server::new_async().await;
    let reverse = geo
        .mock("GET", "/reverse?lat=48.2&lon=16.37&format=jsonv2")
        .match_header("Authorization", Matcher::Missing)
        .match_header(JWT_HEADER, Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"display_name": "Stephansplatz, Vienna, Austria"}"#)
        .create_async()
        .await;

    let config = Config {
        geocoder_url: geo.url(),
        ..Config::default()
    };
    let geocoder = Geocoder::new(&config).unwrap();
    let address = geocoder.reverse(48.2, 16.37).await.unwrap();
    assert_eq!(address, "Stephansplatz, Vienna, Austria");
    reverse.assert_async().await;
}
