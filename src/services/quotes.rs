use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::{
        api::{Page, Paginated},
        quote::QuoteView,
    },
    repositories::{favorite as favorite_repo, quote as quote_repo},
    state::AppState,
};

/// Loads a quote as `viewer` sees it, including their vote and favorite status.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `quote_id` - The ID of the quote.
/// * `viewer` - The authenticated user, if any.
///
/// # Returns
///
/// A `Result` containing the `QuoteView`, or `NotFound`.
pub async fn get_quote(
    state: &AppState,
    quote_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<QuoteView> {
    let quote = quote_repo::find_by_id(&state.db, &quote_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let (user_vote, is_favorited) = match viewer {
        Some(user_id) => (
            Some(state.votes.current_vote(user_id, quote_id).await?),
            favorite_repo::is_favorited(&state.db, &user_id, &quote_id).await?,
        ),
        None => (None, false),
    };

    Ok(QuoteView::new(quote, user_vote, is_favorited))
}

/// Adds a quote to the user's favorites.
pub async fn favorite(state: &AppState, user_id: Uuid, quote_id: Uuid) -> Result<()> {
    if !quote_repo::exists(&state.db, &quote_id).await? {
        return Err(AppError::NotFound);
    }

    if !favorite_repo::add(&state.db, &user_id, &quote_id).await? {
        return Err(AppError::Validation("Quote already favorited".to_string()));
    }

    tracing::info!("⭐ Quote {} favorited by {}", quote_id, user_id);
    Ok(())
}

/// Removes a quote from the user's favorites.
pub async fn unfavorite(state: &AppState, user_id: Uuid, quote_id: Uuid) -> Result<()> {
    if !favorite_repo::remove(&state.db, &user_id, &quote_id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!("⭐ Quote {} unfavorited by {}", quote_id, user_id);
    Ok(())
}

/// Lists the user's favorites, newest first.
pub async fn list_favorites(
    state: &AppState,
    user_id: Uuid,
    page: Page,
) -> Result<Paginated<QuoteView>> {
    let total = favorite_repo::count_for_user(&state.db, &user_id).await?;
    let favorites =
        favorite_repo::list_for_user(&state.db, &user_id, page.limit, page.offset()).await?;

    let quotes = favorites
        .into_iter()
        .map(|(quote, vote)| QuoteView::new(quote, Some(vote), true))
        .collect();

    Ok(Paginated::new(quotes, page, total))
}
