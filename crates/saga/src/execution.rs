//! In-flight record of one saga execution.

use chrono::{DateTime, Utc};
use common::{AccountId, Money, OrderId, SagaId, WalletId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};
use crate::state::SagaState;

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: SagaState,
    pub to: SagaState,
    pub at: DateTime<Utc>,
}

/// Tracks the state of a saga execution and the context it accumulates
/// (total, wallet, debited amount, order id) so compensation knows exactly
/// what to reverse.
///
/// Lives only for the duration of one `create_order` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaExecution {
    saga_id: SagaId,
    account_id: AccountId,
    state: SagaState,
    started_at: DateTime<Utc>,
    transitions: Vec<Transition>,
    total: Option<Money>,
    wallet_id: Option<WalletId>,
    /// Amount actually debited; set only after the wallet service confirmed.
    debited: Option<Money>,
    order_id: Option<OrderId>,
    failure_reason: Option<String>,
}

impl SagaExecution {
    /// Starts a new execution in the `Pricing` state.
    pub fn start(account_id: AccountId) -> Self {
        Self {
            saga_id: SagaId::new(),
            account_id,
            state: SagaState::Pricing,
            started_at: Utc::now(),
            transitions: Vec::new(),
            total: None,
            wallet_id: None,
            debited: None,
            order_id: None,
            failure_reason: None,
        }
    }

    /// Moves to `next`, rejecting edges the state machine does not allow.
    pub fn advance(&mut self, next: SagaState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SagaError::InvalidState {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(saga_id = %self.saga_id, from = %self.state, to = %next, "saga transition");
        self.transitions.push(Transition {
            from: self.state,
            to: next,
            at: Utc::now(),
        });
        self.state = next;
        Ok(())
    }

    pub fn record_total(&mut self, total: Money) {
        self.total = Some(total);
    }

    pub fn record_wallet(&mut self, wallet_id: WalletId) {
        self.wallet_id = Some(wallet_id);
    }

    pub fn record_debit(&mut self, amount: Money) {
        self.debited = Some(amount);
    }

    pub fn record_order(&mut self, order_id: OrderId) {
        self.order_id = Some(order_id);
    }

    pub fn record_failure(&mut self, reason: impl Into<String>) {
        self.failure_reason = Some(reason.into());
    }
}

// Query methods
impl SagaExecution {
    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns every transition taken so far, oldest first.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Returns the sequence of states visited, starting with `Pricing`.
    pub fn path(&self) -> Vec<SagaState> {
        std::iter::once(SagaState::Pricing)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }

    pub fn total(&self) -> Option<Money> {
        self.total
    }

    pub fn wallet_id(&self) -> Option<&WalletId> {
        self.wallet_id.as_ref()
    }

    pub fn debited(&self) -> Option<Money> {
        self.debited
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        self.order_id.as_ref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}
