use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::vote::{CounterDelta, VoteTally, VoteValue},
    repositories::vote::VoteStore,
};

#[derive(Debug, Default)]
struct QuoteRow {
    upvotes: i32,
    downvotes: i32,
    votes: HashMap<Uuid, VoteValue>,
}

/// Vote store kept entirely in memory. The quote's map entry plays the role of
/// the row lock: the vote record and counters change under one write guard.
#[derive(Clone, Default)]
pub struct MemoryVoteStore {
    quotes: Arc<DashMap<Uuid, QuoteRow>>,
}

impl MemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a quote with starting counters and no vote records.
    pub fn insert_quote(&self, quote_id: Uuid, upvotes: i32, downvotes: i32) {
        self.quotes.insert(
            quote_id,
            QuoteRow { upvotes, downvotes, votes: HashMap::new() },
        );
    }

    /// `(upvotes, downvotes)` for a known quote.
    pub fn counters(&self, quote_id: Uuid) -> Option<(i32, i32)> {
        self.quotes.get(&quote_id).map(|q| (q.upvotes, q.downvotes))
    }

    /// The stored vote record, if any. `None` means no record exists.
    pub fn stored_vote(&self, user_id: Uuid, quote_id: Uuid) -> Option<VoteValue> {
        self.quotes
            .get(&quote_id)
            .and_then(|q| q.votes.get(&user_id).copied())
    }
}

impl VoteStore for MemoryVoteStore {
    async fn apply_vote(
        &self,
        user_id: Uuid,
        quote_id: Uuid,
        requested: VoteValue,
    ) -> Result<VoteTally> {
        let mut quote = self.quotes.get_mut(&quote_id).ok_or(AppError::NotFound)?;

        let previous = quote.votes.get(&user_id).copied().unwrap_or_default();
        let delta = CounterDelta::between(previous, requested);

        let upvotes = quote.upvotes + delta.upvotes;
        let downvotes = quote.downvotes + delta.downvotes;
        if upvotes < 0 || downvotes < 0 {
            return Err(AppError::Internal(format!(
                "counters for quote {quote_id} would go negative"
            )));
        }

        match requested {
            VoteValue::None => {
                quote.votes.remove(&user_id);
            }
            value => {
                quote.votes.insert(user_id, value);
            }
        }
        quote.upvotes = upvotes;
        quote.downvotes = downvotes;

        Ok(VoteTally { upvotes, downvotes, user_vote: requested })
    }

    async fn current_vote(&self, user_id: Uuid, quote_id: Uuid) -> Result<VoteValue> {
        let quote = self.quotes.get(&quote_id).ok_or(AppError::NotFound)?;
        Ok(quote.votes.get(&user_id).copied().unwrap_or_default())
    }
}
