use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    models::session::CurrentUser,
    state::AppState,
};

/// The name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_token";

/// Extracts the session token from the request cookies.
fn extract_session_token(cookies: &Cookies) -> Option<String> {
    cookies
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// Resolves the caller from the session cookie. `None` means anonymous.
pub fn resolve_session(state: &AppState, cookies: &Cookies) -> Option<CurrentUser> {
    let token = extract_session_token(cookies)?;
    let user_id = state.sessions.validate(&token)?;
    Some(CurrentUser { user_id, token })
}

/// A middleware that requires a valid session to be present.
///
/// On success the `CurrentUser` is inserted into the request extensions.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `cookies` - The request cookies.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    tracing::debug!("🔐 Checking authentication...");

    let user = resolve_session(&state, &cookies).ok_or_else(|| {
        tracing::debug!("❌ No live session for request");
        AppError::Unauthenticated
    })?;

    tracing::debug!("✅ User authenticated: {}", user.user_id);

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
