use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::aio::ConnectionManager;
use sonic_rs::JsonValueTrait;
use std::net::SocketAddr;

use crate::{error::AppError, state::AppState, validation::auth::normalize_email};

/// Registrations allowed per IP inside one window.
const REGISTER_MAX_ATTEMPTS: i32 = 5;
/// Failed logins allowed per email inside one window.
const LOGIN_MAX_FAILURES: i32 = 5;
/// Window length for both limits, in seconds (12 hours).
const WINDOW_SECS: i64 = 43_200;
/// Largest login body we buffer to read the email from.
const LOGIN_BODY_LIMIT: usize = 16 * 1024;

/// Extracts the real IP address from the request extensions.
fn extract_real_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reads the attempt counter. Redis failures read as zero so auth stays available.
async fn attempts(redis: &mut ConnectionManager, key: &str) -> i32 {
    let count: redis::RedisResult<Option<i32>> = redis::cmd("GET").arg(key).query_async(redis).await;

    match count {
        Ok(count) => count.unwrap_or(0),
        Err(e) => {
            tracing::warn!("⚠️ Rate limit read failed for {}: {}", key, e);
            0
        }
    }
}

async fn minutes_left(redis: &mut ConnectionManager, key: &str) -> i64 {
    let ttl: Option<i64> = redis::cmd("TTL")
        .arg(key)
        .query_async(redis)
        .await
        .unwrap_or(None);
    ttl.unwrap_or(0).max(0) / 60
}

/// Bumps the counter and (re)arms the window.
async fn record_attempt(redis: &mut ConnectionManager, key: &str) {
    let result: redis::RedisResult<()> = redis::pipe()
        .cmd("INCR").arg(key).ignore()
        .cmd("EXPIRE").arg(key).arg(WINDOW_SECS).ignore()
        .query_async(redis)
        .await;

    if let Err(e) = result {
        tracing::warn!("⚠️ Rate limit write failed for {}: {}", key, e);
    }
}

async fn clear_attempts(redis: &mut ConnectionManager, key: &str) {
    let result: redis::RedisResult<()> = redis::cmd("DEL").arg(key).query_async(redis).await;
    if let Err(e) = result {
        tracing::warn!("⚠️ Rate limit reset failed for {}: {}", key, e);
    }
}

/// A middleware that rate limits user registration per client IP.
pub async fn rate_limit_register(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let mut redis = state.redis.clone();
    let ip = extract_real_ip(&req);
    let key = format!("rate_limit:register:{}", ip);

    if attempts(&mut redis, &key).await >= REGISTER_MAX_ATTEMPTS {
        return AppError::RateLimitExceeded(format!(
            "Registration limit exceeded. Try again in {} minutes",
            minutes_left(&mut redis, &key).await
        ))
        .into_response();
    }

    record_attempt(&mut redis, &key).await;

    next.run(req).await
}

/// A middleware that rate limits failed logins per email.
///
/// The body is buffered to read the email and then handed on unchanged.
/// Client errors count as failures; a successful login clears the counter.
pub async fn rate_limit_login(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, LOGIN_BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return AppError::Validation("Request body too large".to_string()).into_response();
        }
    };

    let email = sonic_rs::from_slice::<sonic_rs::Value>(&body_bytes)
        .ok()
        .and_then(|json| json.get("email").and_then(|v| v.as_str()).map(normalize_email))
        .unwrap_or_else(|| "unknown".to_string());

    let mut redis = state.redis.clone();
    let key = format!("rate_limit:login:{}", email);

    if attempts(&mut redis, &key).await >= LOGIN_MAX_FAILURES {
        return AppError::RateLimitExceeded(format!(
            "Too many failed login attempts. Try again in {} minutes",
            minutes_left(&mut redis, &key).await
        ))
        .into_response();
    }

    let response = next.run(Request::from_parts(parts, Body::from(body_bytes))).await;

    if response.status().is_client_error() {
        record_attempt(&mut redis, &key).await;
    } else if response.status().is_success() {
        clear_attempts(&mut redis, &key).await;
    }

    response
}
