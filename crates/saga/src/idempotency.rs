//! Remembers outcomes per client-supplied idempotency key so a retried
//! request never debits twice.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{AccountId, ProductId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{Result, SagaError};
use crate::model::IdempotencyKey;
use crate::outcome::SagaOutcome;

type EntryKey = (AccountId, IdempotencyKey);

#[derive(Debug, Clone)]
enum Slot {
    InFlight,
    Done {
        outcome: SagaOutcome,
        finished_at: Instant,
    },
}

#[derive(Debug, Clone)]
struct Record {
    fingerprint: Vec<ProductId>,
    slot: Slot,
}

/// Result of claiming a key.
#[derive(Debug)]
pub enum Claim {
    /// First use of the key; run the saga and complete the claim.
    Fresh(IdempotencyClaim),
    /// The key already finished; hand back the remembered outcome.
    Replay(SagaOutcome),
}

/// Outcome cache keyed by `(account, idempotency key)`.
#[derive(Debug, Clone)]
pub struct IdempotencyStore {
    entries: Arc<DashMap<EntryKey, Record>>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Claims `key` for a request with the given product list.
    ///
    /// Fails with `DuplicateRequest` while another execution holds the key,
    /// and with `Validation` if the key was used for a different order.
    pub fn begin(
        &self,
        account_id: AccountId,
        key: &IdempotencyKey,
        product_ids: &[ProductId],
    ) -> Result<Claim> {
        let entry_key = (account_id, key.clone());
        match self.entries.entry(entry_key.clone()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get();
                let replay = match &record.slot {
                    Slot::Done {
                        finished_at,
                        outcome,
                    } if finished_at.elapsed() < self.ttl => Some(outcome.clone()),
                    Slot::Done { .. } => None,
                    Slot::InFlight => {
                        if record.fingerprint != product_ids {
                            return Err(mismatch(key));
                        }
                        return Err(SagaError::DuplicateRequest(key.to_string()));
                    }
                };
                if let Some(outcome) = replay {
                    if record.fingerprint != product_ids {
                        return Err(mismatch(key));
                    }
                    return Ok(Claim::Replay(outcome));
                }
                occupied.insert(Record {
                    fingerprint: product_ids.to_vec(),
                    slot: Slot::InFlight,
                });
                Ok(Claim::Fresh(self.claim(entry_key)))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Record {
                    fingerprint: product_ids.to_vec(),
                    slot: Slot::InFlight,
                });
                Ok(Claim::Fresh(self.claim(entry_key)))
            }
        }
    }

    /// Drops every finished entry older than the TTL.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, record| match record.slot {
            Slot::InFlight => true,
            Slot::Done { finished_at, .. } => finished_at.elapsed() < ttl,
        });
    }

    /// Returns the number of remembered keys, in flight or finished.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn claim(&self, key: EntryKey) -> IdempotencyClaim {
        IdempotencyClaim {
            store: self.clone(),
            key: Some(key),
        }
    }
}

fn mismatch(key: &IdempotencyKey) -> SagaError {
    SagaError::Validation(format!(
        "idempotency key '{key}' was already used for a different order"
    ))
}

/// Exclusive claim on a key. Released without an outcome on drop, so a
/// crashed execution does not block retries forever.
#[derive(Debug)]
pub struct IdempotencyClaim {
    store: IdempotencyStore,
    key: Option<EntryKey>,
}

impl IdempotencyClaim {
    /// Records the outcome. Rejections are forgotten: nothing moved, so a
    /// retry is a fresh attempt.
    pub fn complete(mut self, outcome: &SagaOutcome) {
        let Some(key) = self.key.take() else {
            return;
        };
        if !outcome.money_moved() {
            self.store.entries.remove(&key);
            return;
        }
        if let Some(mut record) = self.store.entries.get_mut(&key) {
            record.slot = Slot::Done {
                outcome: outcome.clone(),
                finished_at: Instant::now(),
            };
        }
        self.store.purge_expired();
    }
}

impl Drop for IdempotencyClaim {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.store.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::CompensationStatus;
    use common::{Money, WalletId};

    fn key(raw: &str) -> IdempotencyKey {
        IdempotencyKey::parse(raw).unwrap()
    }

    fn moved_outcome() -> SagaOutcome {
        SagaOutcome::FailedAfterDebit {
            error: SagaError::unavailable("order", "timeout"),
            compensation: CompensationStatus::Reconciled,
            wallet_id: WalletId::new("WAL-0001"),
            amount: Money::from_cents(7000),
        }
    }

    #[test]
    fn test_fresh_then_replay() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        let account = AccountId::new();
        let products = vec![ProductId::new()];

        let Claim::Fresh(claim) = store.begin(account, &key("k1"), &products).unwrap() else {
            panic!("expected fresh claim");
        };
        claim.complete(&moved_outcome());

        match store.begin(account, &key("k1"), &products).unwrap() {
            Claim::Replay(outcome) => assert_eq!(outcome, moved_outcome()),
            Claim::Fresh(_) => panic!("expected replay"),
        }
    }

    #[test]
    fn test_in_flight_duplicate_is_refused() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        let account = AccountId::new();
        let products = vec![ProductId::new()];

        let _claim = store.begin(account, &key("k1"), &products).unwrap();
        let err = store.begin(account, &key("k1"), &products).unwrap_err();
        assert_eq!(err, SagaError::DuplicateRequest("k1".to_string()));
    }

    #[test]
    fn test_key_reuse_with_different_order() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        let account = AccountId::new();

        let _claim = store.begin(account, &key("k1"), &[ProductId::new()]).unwrap();
        let err = store
            .begin(account, &key("k1"), &[ProductId::new()])
            .unwrap_err();
        assert!(matches!(err, SagaError::Validation(_)));
    }

    #[test]
    fn test_keys_are_scoped_per_account() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        let products = vec![ProductId::new()];

        let _a = store.begin(AccountId::new(), &key("k1"), &products).unwrap();
        let b = store.begin(AccountId::new(), &key("k1"), &products).unwrap();
        assert!(matches!(b, Claim::Fresh(_)));
    }

    #[test]
    fn test_rejection_is_forgotten() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        let account = AccountId::new();
        let products = vec![ProductId::new()];

        let Claim::Fresh(claim) = store.begin(account, &key("k1"), &products).unwrap() else {
            panic!("expected fresh claim");
        };
        claim.complete(&SagaOutcome::Rejected {
            reason: SagaError::AmountOverflow,
        });
        assert!(store.is_empty());
    }

    #[test]
    fn test_dropped_claim_releases_key() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        let account = AccountId::new();
        let products = vec![ProductId::new()];

        drop(store.begin(account, &key("k1"), &products).unwrap());
        assert!(matches!(
            store.begin(account, &key("k1"), &products).unwrap(),
            Claim::Fresh(_)
        ));
    }

    #[test]
    fn test_expired_outcome_is_not_replayed() {
        let store = IdempotencyStore::new(Duration::ZERO);
        let account = AccountId::new();
        let products = vec![ProductId::new()];

        let Claim::Fresh(claim) = store.begin(account, &key("k1"), &products).unwrap() else {
            panic!("expected fresh claim");
        };
        claim.complete(&moved_outcome());
        assert!(matches!(
            store.begin(account, &key("k1"), &[ProductId::new()]).unwrap(),
            Claim::Fresh(_)
        ));
    }
}
