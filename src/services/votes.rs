use dashmap::{DashMap, mapref::entry::Entry};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::vote::{VoteTally, VoteValue},
    repositories::vote::VoteStore,
};

struct Slot {
    lock: Arc<Mutex<()>>,
    /// Holders plus waiters. The slot leaves the table when this reaches zero.
    users: usize,
}

/// A table of async mutexes created on demand per key and dropped once unused.
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    slots: Arc<DashMap<K, Slot>>,
}

impl<K: Eq + Hash + Clone> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self { slots: Arc::clone(&self.slots) }
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self { slots: Arc::new(DashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    /// Waits for the lock on `key`.
    ///
    /// Dropping the returned future before it resolves gives up the place in
    /// line and prunes the slot if no one else uses it.
    pub async fn acquire(&self, key: K) -> KeyGuard<K> {
        let lock = {
            let mut slot = self.slots.entry(key.clone()).or_insert_with(|| Slot {
                lock: Arc::new(Mutex::new(())),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.lock)
        };
        let ticket = Ticket {
            key,
            slots: Arc::clone(&self.slots),
        };

        let guard = lock.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Number of keys currently locked or awaited.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// One registered user of a slot, holding or waiting.
struct Ticket<K: Eq + Hash + Clone> {
    key: K,
    slots: Arc<DashMap<K, Slot>>,
}

impl<K: Eq + Hash + Clone> Drop for Ticket<K> {
    fn drop(&mut self) {
        if let Entry::Occupied(mut slot) = self.slots.entry(self.key.clone()) {
            slot.get_mut().users -= 1;
            if slot.get().users == 0 {
                slot.remove();
            }
        }
    }
}

/// Held while a key is locked. Dropping it unlocks, then prunes the slot when
/// no one else is waiting on it.
pub struct KeyGuard<K: Eq + Hash + Clone> {
    // Field order matters: the mutex is released before the ticket is returned.
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket<K>,
}

/// Enforces one live vote per (user, quote) and keeps quote counters in step.
#[derive(Clone)]
pub struct VoteLedger<S: VoteStore> {
    store: S,
    locks: KeyedLocks<(Uuid, Uuid)>,
}

impl<S: VoteStore> VoteLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: KeyedLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Moves the user's vote on `quote_id` to `requested` and returns the committed counters.
    ///
    /// `VoteValue::None` removes the vote. Calls for the same (user, quote) run one
    /// at a time; a write conflict reported by the store is retried once.
    pub async fn apply_vote(
        &self,
        user_id: Uuid,
        quote_id: Uuid,
        requested: VoteValue,
    ) -> Result<VoteTally> {
        let _guard = self.locks.acquire((user_id, quote_id)).await;

        match self.store.apply_vote(user_id, quote_id, requested).await {
            Err(AppError::Conflict(code)) => {
                tracing::warn!(
                    "⚠️ Vote conflict on quote {} (sqlstate {}), retrying once",
                    quote_id,
                    code
                );
                self.store.apply_vote(user_id, quote_id, requested).await
            }
            other => other,
        }
    }

    pub async fn current_vote(&self, user_id: Uuid, quote_id: Uuid) -> Result<VoteValue> {
        self.store.current_vote(user_id, quote_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryVoteStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ledger_with_quote(up: i32, down: i32) -> (VoteLedger<MemoryVoteStore>, Uuid) {
        let store = MemoryVoteStore::new();
        let quote = Uuid::new_v4();
        store.insert_quote(quote, up, down);
        (VoteLedger::new(store), quote)
    }

    fn counts(tally: VoteTally) -> (i32, i32) {
        (tally.upvotes, tally.downvotes)
    }

    #[tokio::test]
    async fn upvote_switch_and_clear_scenario() {
        let (ledger, quote) = ledger_with_quote(5, 2);
        let user = Uuid::new_v4();

        let up = ledger.apply_vote(user, quote, VoteValue::Up).await.unwrap();
        assert_eq!(counts(up), (6, 2));
        assert_eq!(up.user_vote, VoteValue::Up);

        let switched = ledger.apply_vote(user, quote, VoteValue::Down).await.unwrap();
        assert_eq!(counts(switched), (5, 3));

        let cleared = ledger.apply_vote(user, quote, VoteValue::None).await.unwrap();
        assert_eq!(counts(cleared), (5, 2));
        assert_eq!(cleared.user_vote, VoteValue::None);
        assert_eq!(ledger.store().stored_vote(user, quote), None);
    }

    #[tokio::test]
    async fn repeating_a_vote_is_a_no_op() {
        let (ledger, quote) = ledger_with_quote(0, 0);
        let user = Uuid::new_v4();

        let first = ledger.apply_vote(user, quote, VoteValue::Up).await.unwrap();
        let second = ledger.apply_vote(user, quote, VoteValue::Up).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(counts(second), (1, 0));
    }

    #[tokio::test]
    async fn vote_then_clear_restores_counters() {
        let (ledger, quote) = ledger_with_quote(3, 4);
        let user = Uuid::new_v4();

        ledger.apply_vote(user, quote, VoteValue::Up).await.unwrap();
        let cleared = ledger.apply_vote(user, quote, VoteValue::None).await.unwrap();

        assert_eq!(counts(cleared), (3, 4));
    }

    #[tokio::test]
    async fn clearing_without_a_vote_changes_nothing() {
        let (ledger, quote) = ledger_with_quote(2, 2);
        let user = Uuid::new_v4();

        let tally = ledger.apply_vote(user, quote, VoteValue::None).await.unwrap();

        assert_eq!(counts(tally), (2, 2));
        assert_eq!(ledger.store().stored_vote(user, quote), None);
    }

    #[tokio::test]
    async fn switching_down_to_up() {
        let (ledger, quote) = ledger_with_quote(0, 0);
        let user = Uuid::new_v4();

        ledger.apply_vote(user, quote, VoteValue::Down).await.unwrap();
        let tally = ledger.apply_vote(user, quote, VoteValue::Up).await.unwrap();

        assert_eq!(counts(tally), (1, 0));
        assert_eq!(ledger.current_vote(user, quote).await.unwrap(), VoteValue::Up);
    }

    #[tokio::test]
    async fn unknown_quote_is_not_found() {
        let (ledger, _) = ledger_with_quote(0, 0);
        let err = ledger
            .apply_vote(Uuid::new_v4(), Uuid::new_v4(), VoteValue::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upvotes_from_different_users_all_count() {
        let (ledger, quote) = ledger_with_quote(5, 2);

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger.apply_vote(Uuid::new_v4(), quote, VoteValue::Up).await
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        assert_eq!(ledger.store().counters(quote), Some((69, 2)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_votes_by_one_user_keep_counters_consistent() {
        let (ledger, quote) = ledger_with_quote(0, 0);
        let user = Uuid::new_v4();
        let values = [VoteValue::Up, VoteValue::Down, VoteValue::None];

        let tasks: Vec<_> = (0..90)
            .map(|i| {
                let ledger = ledger.clone();
                let value = values[i % values.len()];
                tokio::spawn(async move { ledger.apply_vote(user, quote, value).await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let expected = match ledger.store().stored_vote(user, quote) {
            Some(VoteValue::Up) => (1, 0),
            Some(VoteValue::Down) => (0, 1),
            _ => (0, 0),
        };
        assert_eq!(ledger.store().counters(quote), Some(expected));
        assert!(ledger.locks.is_empty());
    }

    #[derive(Clone, Default)]
    struct ConflictOnce {
        inner: MemoryVoteStore,
        calls: Arc<AtomicUsize>,
        conflicts: usize,
    }

    impl VoteStore for ConflictOnce {
        async fn apply_vote(
            &self,
            user_id: Uuid,
            quote_id: Uuid,
            requested: VoteValue,
        ) -> Result<VoteTally> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.conflicts {
                return Err(AppError::Conflict("23505".to_string()));
            }
            self.inner.apply_vote(user_id, quote_id, requested).await
        }

        async fn current_vote(&self, user_id: Uuid, quote_id: Uuid) -> Result<VoteValue> {
            self.inner.current_vote(user_id, quote_id).await
        }
    }

    #[tokio::test]
    async fn a_single_conflict_is_retried() {
        let store = ConflictOnce { conflicts: 1, ..Default::default() };
        let quote = Uuid::new_v4();
        store.inner.insert_quote(quote, 0, 0);
        let ledger = VoteLedger::new(store);

        let tally = ledger.apply_vote(Uuid::new_v4(), quote, VoteValue::Up).await.unwrap();

        assert_eq!(counts(tally), (1, 0));
        assert_eq!(ledger.store().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_second_conflict_is_surfaced() {
        let store = ConflictOnce { conflicts: 2, ..Default::default() };
        let quote = Uuid::new_v4();
        store.inner.insert_quote(quote, 0, 0);
        let ledger = VoteLedger::new(store);

        let err = ledger
            .apply_vote(Uuid::new_v4(), quote, VoteValue::Up)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert!(err.is_retryable());
        assert_eq!(ledger.store().inner.counters(quote), Some((0, 0)));
    }

    #[tokio::test]
    async fn lock_table_is_pruned_after_release() {
        let locks: KeyedLocks<u32> = KeyedLocks::default();
        {
            let _a = locks.acquire(1).await;
            let _b = locks.acquire(2).await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }

    async fn wait_for_users(locks: &KeyedLocks<u32>, key: u32, users: usize) {
        while locks.slots.get(&key).map(|s| s.users) != Some(users) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn cancelled_waiter_after_release_leaves_no_entry() {
        let locks: KeyedLocks<u32> = KeyedLocks::default();
        let held = locks.acquire(7).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(7).await;
                std::future::pending::<()>().await;
            })
        };
        wait_for_users(&locks, 7, 2).await;

        drop(held);
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn cancelled_waiter_while_held_leaves_only_the_holder() {
        let locks: KeyedLocks<u32> = KeyedLocks::default();
        let held = locks.acquire(7).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(7).await;
            })
        };
        wait_for_users(&locks, 7, 2).await;

        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert_eq!(locks.slots.get(&7).map(|s| s.users), Some(1));

        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn released_lock_can_be_taken_again() {
        let locks: KeyedLocks<u32> = KeyedLocks::default();
        drop(locks.acquire(3).await);
        let again = locks.acquire(3).await;
        assert_eq!(locks.len(), 1);
        drop(again);
        assert!(locks.is_empty());
    }
}
