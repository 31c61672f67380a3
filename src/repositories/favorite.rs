use deadpool_postgres::Pool;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::{quote::Quote, vote::VoteValue},
    repositories::quote::row_to_quote,
};

/// Records a favorite. Returns `false` when the pair was already present.
pub async fn add(pool: &Pool, user_id: &Uuid, quote_id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let inserted = client
        .execute(
            r#"
            INSERT INTO favorites (user_id, quote_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, quote_id) DO NOTHING
            "#,
            &[user_id, quote_id],
        )
        .await
        .map_err(AppError::from_pg)?;
    Ok(inserted == 1)
}

/// Deletes a favorite. Returns `false` when there was nothing to delete.
pub async fn remove(pool: &Pool, user_id: &Uuid, quote_id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let deleted = client
        .execute(
            "DELETE FROM favorites WHERE user_id = $1 AND quote_id = $2",
            &[user_id, quote_id],
        )
        .await?;
    Ok(deleted > 0)
}

/// Whether the user has favorited the quote.
pub async fn is_favorited(pool: &Pool, user_id: &Uuid, quote_id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = $1 AND quote_id = $2) AS found",
            &[user_id, quote_id],
        )
        .await?;
    row.try_get("found").map_err(|_| AppError::MissingData("found".to_string()))
}

/// Number of quotes the user has favorited.
pub async fn count_for_user(pool: &Pool, user_id: &Uuid) -> Result<i64> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            "SELECT COUNT(*) AS total FROM favorites WHERE user_id = $1",
            &[user_id],
        )
        .await?;
    row.try_get("total").map_err(|_| AppError::MissingData("total".to_string()))
}

/// The user's favorited quotes, newest favorite first, each with the user's own vote.
pub async fn list_for_user(
    pool: &Pool,
    user_id: &Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<(Quote, VoteValue)>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT q.id, q.text, q.date, q.origin, q.origin_name, q.upvotes, q.downvotes,
                   q.created_at, p.id AS person_id, p.name AS person_name,
                   p.category AS person_category, v.value AS user_vote
            FROM favorites f
            JOIN quotes q ON q.id = f.quote_id
            JOIN persons p ON p.id = q.person_id
            LEFT JOIN votes v ON v.quote_id = f.quote_id AND v.user_id = f.user_id
            WHERE f.user_id = $1
            ORDER BY f.created_at DESC, f.quote_id
            LIMIT $2 OFFSET $3
            "#,
            &[user_id, &limit, &offset],
        )
        .await?;

    rows.iter()
        .map(|row| -> Result<(Quote, VoteValue)> {
            let quote = row_to_quote(row)?;
            let vote: Option<i32> = row
                .try_get("user_vote")
                .map_err(|_| AppError::MissingData("user_vote".to_string()))?;
            let vote = match vote {
                Some(value) => VoteValue::try_from(value).map_err(|_| {
                    AppError::Internal(format!("stored vote has invalid value {value}"))
                })?,
                None => VoteValue::None,
            };
            Ok((quote, vote))
        })
        .collect()
}
