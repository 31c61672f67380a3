use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::vote::VoteValue;

/// The person a quote is attributed to, as embedded in quote responses.
#[derive(Debug, Clone, Serialize)]
pub struct PersonRef {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
}

/// A quote joined with its person.
#[derive(Debug, Clone)]
pub struct Quote {
    pub id: Uuid,
    pub text: String,
    pub date: Option<String>,
    pub origin: Option<String>,
    pub origin_name: Option<String>,
    pub upvotes: i32,
    pub downvotes: i32,
    pub created_at: DateTime<Utc>,
    pub person: PersonRef,
}

/// A quote as seen by one (possibly anonymous) viewer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteView {
    pub id: Uuid,
    pub text: String,
    pub date: Option<String>,
    pub origin: Option<String>,
    pub origin_name: Option<String>,
    pub upvotes: i32,
    pub downvotes: i32,
    pub created_at: DateTime<Utc>,
    pub person: PersonRef,
    /// `None` for anonymous viewers and for viewers who have not voted.
    pub user_vote: Option<VoteValue>,
    pub is_favorited: bool,
}

impl QuoteView {
    pub fn new(quote: Quote, user_vote: Option<VoteValue>, is_favorited: bool) -> Self {
        Self {
            id: quote.id,
            text: quote.text,
            date: quote.date,
            origin: quote.origin,
            origin_name: quote.origin_name,
            upvotes: quote.upvotes,
            downvotes: quote.downvotes,
            created_at: quote.created_at,
            person: quote.person,
            user_vote: user_vote.filter(|v| *v != VoteValue::None),
            is_favorited,
        }
    }
}
