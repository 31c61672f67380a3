use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tower_cookies::{Cookies, Cookie};
use tower_cookies::cookie::time::Duration;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::SESSION_COOKIE,
    models::{
        api::ApiResponse,
        session::CurrentUser,
        user::{User, UserPublic},
    },
    repositories::user as user_repo,
    services::auth as auth_service,
    state::AppState,
    validation::auth::*,
};

/// The request payload for user registration.
#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[garde(email)]
    pub email: String,
    #[garde(skip)]
    pub username: String,
    #[garde(skip)]
    pub password: String,
}

/// The request payload for user login.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1))]
    pub password: String,
}

/// The payload returned after registration and login.
#[derive(Serialize)]
pub struct AuthSession {
    pub user: UserPublic,
    pub token: String,
}

/// Creates the session cookie with the given value and max age.
fn session_cookie(value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);
    cookie.set_http_only(true);
    if secure {
        cookie.set_secure(true);
    }
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(max_age);
    cookie.set_path("/");
    cookie
}

/// Opens a session for `user`, sets the cookie and returns the response payload.
fn start_session(state: &AppState, cookies: &Cookies, user: &User) -> AuthSession {
    let token = state.sessions.create(user.id);

    cookies.add(session_cookie(
        token.clone(),
        Duration::seconds(state.sessions.ttl().num_seconds()),
        state.config.secure_cookies,
    ));
    tracing::info!("✅ Session cookie added for user: {}", user.id);

    AuthSession {
        user: UserPublic::from(user),
        token,
    }
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response> {
    payload.validate().map_err(report_to_error)?;
    validate_username(&payload.username)?;
    validate_password(&payload.password)?;

    let email = normalize_email(&payload.email);
    tracing::info!("📝 Register attempt: {}", payload.username);

    let user = auth_service::register_user(
        &state.db,
        &email,
        &payload.username,
        &payload.password,
    )
    .await?;

    let session = start_session(&state, &cookies, &user);

    tracing::info!("✅ User registered: {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(session, "Registration successful")),
    )
        .into_response())
}

/// Handles user login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    payload.validate().map_err(report_to_error)?;

    let email = normalize_email(&payload.email);

    let user = auth_service::authenticate_user(&state.db, &email, &payload.password).await?;

    let session = start_session(&state, &cookies, &user);

    tracing::info!("✅ User logged in: {}", user.id);

    Ok((
        StatusCode::OK,
        Json(ApiResponse::with_message(session, "Login successful")),
    )
        .into_response())
}

/// Handles user logout.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    cookies: Cookies,
) -> Result<Response> {
    state.sessions.revoke(&user.token);

    cookies.remove(session_cookie(
        String::new(),
        Duration::seconds(0),
        state.config.secure_cookies,
    ));

    tracing::info!("✅ User logged out: {}", user.user_id);

    Ok((StatusCode::OK, Json(ApiResponse::message("Logout successful"))).into_response())
}

/// Returns the authenticated user.
#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Response> {
    let Some(record) = user_repo::find_by_id(&state.db, &user.user_id).await? else {
        state.sessions.revoke(&user.token);
        return Err(AppError::Unauthenticated);
    };

    Ok((StatusCode::OK, Json(ApiResponse::data(UserPublic::from(&record)))).into_response())
}
