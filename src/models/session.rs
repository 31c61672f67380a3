use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A live session held by the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session is dead at and after its expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// The authenticated caller, inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    /// The bearer token that authenticated this request.
    pub token: String,
}
