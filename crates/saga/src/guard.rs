//! Per-account mutual exclusion for the balance check and debit.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use common::AccountId;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table entry: the account's mutex plus the number of tasks holding or
/// waiting for it. The count only changes under the shard lock.
#[derive(Debug)]
struct Slot {
    mutex: Arc<Mutex<()>>,
    users: usize,
}

type LockTable = DashMap<AccountId, Slot>;

/// Keyed lock table: at most one holder per account, no blocking across accounts.
///
/// Entries exist only while some task holds or waits for the account's
/// lock; the last holder or waiter to leave evicts the entry, whether it
/// released the lock or gave up waiting.
#[derive(Debug, Clone, Default)]
pub struct SerializationGuard {
    locks: Arc<LockTable>,
}

/// Exclusive hold on one account. Releases on drop, including during unwinding.
#[derive(Debug)]
pub struct AccountLock {
    // Field order matters: the mutex is released before the entry is evicted.
    _guard: OwnedMutexGuard<()>,
    registration: Registration,
}

/// Counts one task against an account's entry until dropped.
#[derive(Debug)]
struct Registration {
    account_id: AccountId,
    locks: Arc<LockTable>,
}

impl SerializationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `account_id`.
    ///
    /// Safe to cancel: dropping the returned future while it waits leaves
    /// no entry behind.
    pub async fn acquire(&self, account_id: AccountId) -> AccountLock {
        let (registration, mutex) = self.register(account_id);

        let wait_start = Instant::now();
        let guard = mutex.lock_owned().await;
        metrics::histogram!("account_lock_wait_seconds").record(wait_start.elapsed().as_secs_f64());

        AccountLock {
            _guard: guard,
            registration,
        }
    }

    /// Runs `f` while holding the account's lock.
    pub async fn with_account_lock<F, Fut, T>(&self, account_id: AccountId, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _lock = self.acquire(account_id).await;
        f().await
    }

    /// Returns the number of accounts with a held or awaited lock.
    pub fn active_accounts(&self) -> usize {
        self.locks.len()
    }

    fn register(&self, account_id: AccountId) -> (Registration, Arc<Mutex<()>>) {
        let mut slot = self.locks.entry(account_id).or_insert_with(|| Slot {
            mutex: Arc::new(Mutex::new(())),
            users: 0,
        });
        slot.users += 1;
        let mutex = Arc::clone(&slot.mutex);
        drop(slot);

        let registration = Registration {
            account_id,
            locks: Arc::clone(&self.locks),
        };
        (registration, mutex)
    }
}

impl AccountLock {
    pub fn account_id(&self) -> AccountId {
        self.registration.account_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.locks.remove_if_mut(&self.account_id, |_, slot| {
            slot.users -= 1;
            slot.users == 0
        });
    }
}
