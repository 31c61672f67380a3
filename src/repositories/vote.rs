use deadpool_postgres::{Pool, Transaction};
use std::future::Future;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::vote::{CounterDelta, VoteTally, VoteValue},
};

/// Persistence for votes and the quote counters derived from them.
///
/// `apply_vote` must read the previous vote, write the new one and adjust the
/// counters as one atomic unit: afterwards either all of it happened or none of it.
pub trait VoteStore: Clone + Send + Sync + 'static {
    fn apply_vote(
        &self,
        user_id: Uuid,
        quote_id: Uuid,
        requested: VoteValue,
    ) -> impl Future<Output = Result<VoteTally>> + Send;

    /// `VoteValue::None` when the user has no live vote on the quote.
    fn current_vote(
        &self,
        user_id: Uuid,
        quote_id: Uuid,
    ) -> impl Future<Output = Result<VoteValue>> + Send;
}

/// Postgres-backed store. Each vote runs in one transaction holding the quote row lock.
#[derive(Clone)]
pub struct PgVoteStore {
    pool: Pool,
}

impl PgVoteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn decode_vote(value: i32) -> Result<VoteValue> {
    match VoteValue::try_from(value) {
        Ok(VoteValue::None) | Err(_) => Err(AppError::Internal(format!(
            "stored vote has invalid value {value}"
        ))),
        Ok(v) => Ok(v),
    }
}

async fn previous_vote(tx: &Transaction<'_>, user_id: Uuid, quote_id: Uuid) -> Result<VoteValue> {
    let stmt = tx
        .prepare_cached("SELECT value FROM votes WHERE user_id = $1 AND quote_id = $2")
        .await
        .map_err(AppError::from_pg)?;
    let row = tx
        .query_opt(&stmt, &[&user_id, &quote_id])
        .await
        .map_err(AppError::from_pg)?;

    match row {
        Some(row) => {
            let value: i32 = row
                .try_get("value")
                .map_err(|_| AppError::MissingData("value".to_string()))?;
            decode_vote(value)
        }
        None => Ok(VoteValue::None),
    }
}

impl VoteStore for PgVoteStore {
    async fn apply_vote(
        &self,
        user_id: Uuid,
        quote_id: Uuid,
        requested: VoteValue,
    ) -> Result<VoteTally> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await.map_err(AppError::from_pg)?;

        let lock = tx
            .prepare_cached("SELECT upvotes, downvotes FROM quotes WHERE id = $1 FOR UPDATE")
            .await
            .map_err(AppError::from_pg)?;
        let quote = tx
            .query_opt(&lock, &[&quote_id])
            .await
            .map_err(AppError::from_pg)?
            .ok_or(AppError::NotFound)?;

        let previous = previous_vote(&tx, user_id, quote_id).await?;

        if previous == requested {
            let upvotes: i32 = quote
                .try_get("upvotes")
                .map_err(|_| AppError::MissingData("upvotes".to_string()))?;
            let downvotes: i32 = quote
                .try_get("downvotes")
                .map_err(|_| AppError::MissingData("downvotes".to_string()))?;
            tx.commit().await.map_err(AppError::from_pg)?;
            return Ok(VoteTally { upvotes, downvotes, user_vote: requested });
        }

        match requested {
            VoteValue::None => {
                let stmt = tx
                    .prepare_cached("DELETE FROM votes WHERE user_id = $1 AND quote_id = $2")
                    .await
                    .map_err(AppError::from_pg)?;
                tx.execute(&stmt, &[&user_id, &quote_id])
                    .await
                    .map_err(AppError::from_pg)?;
            }
            value => {
                let stmt = tx
                    .prepare_cached(
                        r#"
                        INSERT INTO votes (user_id, quote_id, value)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (user_id, quote_id)
                        DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
                        "#,
                    )
                    .await
                    .map_err(AppError::from_pg)?;
                tx.execute(&stmt, &[&user_id, &quote_id, &value.as_i32()])
                    .await
                    .map_err(AppError::from_pg)?;
            }
        }

        let delta = CounterDelta::between(previous, requested);
        let stmt = tx
            .prepare_cached(
                r#"
                UPDATE quotes
                SET upvotes = upvotes + $2, downvotes = downvotes + $3, updated_at = NOW()
                WHERE id = $1
                RETURNING upvotes, downvotes
                "#,
            )
            .await
            .map_err(AppError::from_pg)?;
        let row = tx
            .query_one(&stmt, &[&quote_id, &delta.upvotes, &delta.downvotes])
            .await
            .map_err(AppError::from_pg)?;

        let tally = VoteTally {
            upvotes: row
                .try_get("upvotes")
                .map_err(|_| AppError::MissingData("upvotes".to_string()))?,
            downvotes: row
                .try_get("downvotes")
                .map_err(|_| AppError::MissingData("downvotes".to_string()))?,
            user_vote: requested,
        };

        tx.commit().await.map_err(AppError::from_pg)?;

        tracing::debug!(
            "🗳️ Vote {} -> {} on quote {} by {} (Δup {}, Δdown {})",
            previous, requested, quote_id, user_id, delta.upvotes, delta.downvotes
        );

        Ok(tally)
    }

    async fn current_vote(&self, user_id: Uuid, quote_id: Uuid) -> Result<VoteValue> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT value FROM votes WHERE user_id = $1 AND quote_id = $2",
                &[&user_id, &quote_id],
            )
            .await?;

        match row {
            Some(row) => {
                let value: i32 = row
                    .try_get("value")
                    .map_err(|_| AppError::MissingData("value".to_string()))?;
                decode_vote(value)
            }
            None => Ok(VoteValue::None),
        }
    }
}
