use axum::{
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension,
    Json,
};
use serde::Deserialize;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::resolve_session,
    models::{
        api::{ApiResponse, Page},
        session::CurrentUser,
        vote::VoteValue,
    },
    services::quotes as quote_service,
    state::AppState,
};

/// The request payload for voting. `0` clears the caller's vote.
#[derive(Deserialize)]
pub struct VoteRequest {
    pub value: Option<i32>,
}

/// Paging parameters for the favorites listing.
#[derive(Deserialize)]
pub struct FavoritesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Turns the raw vote body into a vote value, reporting every malformed body as a validation error.
fn requested_vote(
    payload: std::result::Result<Json<VoteRequest>, JsonRejection>,
) -> Result<VoteValue> {
    let Json(req) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let value = req
        .value
        .ok_or_else(|| AppError::Validation("Vote value is required".to_string()))?;
    VoteValue::try_from(value)
}

/// Gets a single quote. Signed-in callers also see their vote and favorite status.
#[axum::debug_handler]
pub async fn get_quote(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(quote_id): Path<Uuid>,
) -> Result<Response> {
    let viewer = resolve_session(&state, &cookies).map(|u| u.user_id);
    let quote = quote_service::get_quote(&state, quote_id, viewer).await?;

    Ok((StatusCode::OK, Json(ApiResponse::data(quote))).into_response())
}

/// Records, switches or clears the caller's vote on a quote.
#[axum::debug_handler]
pub async fn vote(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(quote_id): Path<Uuid>,
    payload: std::result::Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Response> {
    let value = requested_vote(payload)?;

    let tally = state.votes.apply_vote(user.user_id, quote_id, value).await?;

    tracing::info!(
        "🗳️ User {} voted {} on quote {} ({} up / {} down)",
        user.user_id, value, quote_id, tally.upvotes, tally.downvotes
    );

    Ok((StatusCode::OK, Json(ApiResponse::with_message(tally, "Vote recorded"))).into_response())
}

/// Adds a quote to the caller's favorites.
#[axum::debug_handler]
pub async fn favorite(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(quote_id): Path<Uuid>,
) -> Result<Response> {
    quote_service::favorite(&state, user.user_id, quote_id).await?;
    Ok((StatusCode::OK, Json(ApiResponse::message("Quote favorited"))).into_response())
}

/// Removes a quote from the caller's favorites.
#[axum::debug_handler]
pub async fn unfavorite(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(quote_id): Path<Uuid>,
) -> Result<Response> {
    quote_service::unfavorite(&state, user.user_id, quote_id).await?;
    Ok((StatusCode::OK, Json(ApiResponse::message("Quote unfavorited"))).into_response())
}

/// Lists the caller's favorite quotes, newest first.
#[axum::debug_handler]
pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    query: std::result::Result<Query<FavoritesQuery>, QueryRejection>,
) -> Result<Response> {
    let Query(query) = query.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let page = Page::new(query.page, query.limit);

    let favorites = quote_service::list_favorites(&state, user.user_id, page).await?;

    Ok((StatusCode::OK, Json(ApiResponse::data(favorites))).into_response())
}
