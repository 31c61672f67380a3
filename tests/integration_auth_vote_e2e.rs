//! End-to-end checks against a running server.
//!
//! Needs the server on `E2E_BASE_URL` (default `http://127.0.0.1:3000`), its Redis
//! on `E2E_REDIS_URL`, and an existing quote id in `E2E_QUOTE_ID`.
//! Run with `cargo test -- --ignored`.

use std::time::{SystemTime, UNIX_EPOCH};
use serde_json::{json, Value};
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;

// Shared test context
struct TestContext {
    client: reqwest::Client,
    base_url: String,
}

static REDIS_CLIENT: Lazy<redis::Client> = Lazy::new(|| {
    let url = std::env::var("E2E_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string());
    redis::Client::open(url).unwrap()
});

impl TestContext {
    fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .cookie_store(true)
                .build()
                .unwrap(),
            base_url: std::env::var("E2E_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
        }
    }

    fn get_timestamp() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }

    async fn register(&self, tag: &str) -> Value {
        let stamp = Self::get_timestamp();
        let response = self.client.post(format!("{}/api/auth/register", self.base_url))
            .json(&json!({
                "email": format!("{}_{}@example.test", tag, stamp),
                "username": format!("{}{}", tag, stamp % 1_000_000_000),
                "password": "SecurePass123"
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 201, "Registration failed");
        response.json().await.unwrap()
    }

    async fn vote(&self, quote_id: &str, value: i32) -> Value {
        let response = self.client.post(format!("{}/api/quotes/{}/vote", self.base_url, quote_id))
            .json(&json!({ "value": value }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200, "Vote failed");
        response.json().await.unwrap()
    }
}

async fn get_redis_conn() -> ConnectionManager {
    REDIS_CLIENT.get_connection_manager().await.unwrap()
}

async fn setup() {
    let mut con = get_redis_conn().await;
    let _: () = redis::cmd("DEL").arg("rate_limit:register:127.0.0.1").query_async(&mut con).await.unwrap();
}

fn quote_id() -> String {
    std::env::var("E2E_QUOTE_ID").expect("E2E_QUOTE_ID must name an existing quote")
}

fn counts(body: &Value) -> (i64, i64) {
    (
        body["data"]["upvotes"].as_i64().unwrap(),
        body["data"]["downvotes"].as_i64().unwrap(),
    )
}

#[tokio::test]
#[ignore = "requires a running server with Postgres and Redis"]
async fn session_lifecycle() {
    setup().await;
    let context = TestContext::new();

    let body = context.register("session").await;
    assert_eq!(body["success"], true);
    assert!(body["data"]["token"].as_str().unwrap().len() >= 43);

    let me = context.client.get(format!("{}/api/auth/me", context.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(me.status().as_u16(), 200);

    let logout = context.client.post(format!("{}/api/auth/logout", context.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status().as_u16(), 200);

    let me_again = context.client.get(format!("{}/api/auth/me", context.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(me_again.status().as_u16(), 401);
}

#[tokio::test]
#[ignore = "requires a running server with Postgres and Redis"]
async fn vote_switch_and_clear_round_trip() {
    setup().await;
    let context = TestContext::new();
    context.register("voter").await;
    let quote_id = quote_id();

    let before: Value = context.client.get(format!("{}/api/quotes/{}", context.base_url, quote_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let (up, down) = counts(&before);
    assert!(before["data"]["userVote"].is_null());

    let voted = context.vote(&quote_id, 1).await;
    assert_eq!(counts(&voted), (up + 1, down));
    assert_eq!(voted["data"]["userVote"], 1);

    let switched = context.vote(&quote_id, -1).await;
    assert_eq!(counts(&switched), (up, down + 1));

    let cleared = context.vote(&quote_id, 0).await;
    assert_eq!(counts(&cleared), (up, down));
    assert_eq!(cleared["data"]["userVote"], 0);
}

#[tokio::test]
#[ignore = "requires a running server with Postgres and Redis"]
async fn voting_requires_a_session() {
    let context = TestContext::new();
    let response = context.client.post(format!("{}/api/quotes/{}/vote", context.base_url, quote_id()))
        .json(&json!({ "value": 1 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
}
