//! In-process session store mapping opaque bearer tokens to user ids.
//!
//! The store is built once in `AppState::new`, shared by cloning, and drained
//! with [`SessionStore::shutdown`] after the HTTP server stops. Expired sessions
//! are dropped lazily on lookup; [`SessionStore::spawn_sweeper`] additionally
//! evicts sessions nobody looks up again.

use base64::{Engine as _, engine::general_purpose};
use chrono::Duration;
use dashmap::{DashMap, mapref::entry::Entry};
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::session::Session;

/// The size of a session token in bytes.
const SESSION_TOKEN_SIZE: usize = 32;

/// Concurrent token -> session map with a fixed TTL.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            clock,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mints a new token for `user_id` and records it until `now + ttl`.
    pub fn create(&self, user_id: Uuid) -> String {
        let created_at = self.clock.now();
        let session = Session {
            user_id,
            created_at,
            expires_at: created_at + self.ttl,
        };

        loop {
            let token = generate_token();
            match self.sessions.entry(token) {
                Entry::Occupied(_) => {
                    tracing::warn!("⚠️ Session token collision, minting another");
                }
                Entry::Vacant(slot) => {
                    let token = slot.key().clone();
                    slot.insert(session);
                    tracing::debug!("🔑 Session created for user: {}", user_id);
                    return token;
                }
            }
        }
    }

    /// Returns the owning user id, or `None` for unknown and expired tokens.
    pub fn validate(&self, token: &str) -> Option<Uuid> {
        self.session(token).map(|s| s.user_id)
    }

    /// Looks up the full session record. Expired records are removed on the way.
    pub fn session(&self, token: &str) -> Option<Session> {
        let now = self.clock.now();
        let session = self.sessions.get(token)?.value().clone();

        if session.is_expired_at(now) {
            self.sessions.remove_if(token, |_, s| s.is_expired_at(now));
            tracing::debug!("⌛ Session expired for user: {}", session.user_id);
            return None;
        }

        Some(session)
    }

    /// Removes the session if present. Revoking twice is a no-op.
    pub fn revoke(&self, token: &str) {
        if let Some((_, session)) = self.sessions.remove(token) {
            tracing::debug!("👋 Session revoked for user: {}", session.user_id);
        }
    }

    /// Drops every expired session, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired_at(now));
        before.saturating_sub(self.sessions.len())
    }

    /// Number of sessions currently held, expired or not.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Runs [`purge_expired`](Self::purge_expired) every `interval` until aborted.
    pub fn spawn_sweeper(&self, interval: std::time::Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::info!("🧹 Purged {} expired sessions", purged);
                }
            }
        })
    }

    /// Revokes all sessions. Returns how many were live at the time.
    pub fn shutdown(&self) -> usize {
        let drained = self.sessions.len();
        self.sessions.clear();
        tracing::info!("✅ Session store drained ({} sessions)", drained);
        drained
    }
}

/// Generates a URL-safe token with 256 bits of entropy.
fn generate_token() -> String {
    let mut token = [0u8; SESSION_TOKEN_SIZE];
    OsRng.fill_bytes(&mut token);
    general_purpose::URL_SAFE_NO_PAD.encode(token)
}
