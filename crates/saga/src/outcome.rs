//! Caller-visible result of a create-order saga.

use common::{Money, WalletId};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::model::OrderRecord;
use crate::state::SagaState;

/// Whether a debit was given back after the order could not be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationStatus {
    /// The compensating credit succeeded; the wallet is back where it started.
    Reconciled,
    /// The compensating credit failed; the debit is escalated for manual reconciliation.
    PendingManualReconciliation,
}

impl CompensationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationStatus::Reconciled => "reconciled",
            CompensationStatus::PendingManualReconciliation => "pending_manual_reconciliation",
        }
    }
}

impl std::fmt::Display for CompensationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a saga execution.
///
/// `Rejected` means no money moved. `FailedAfterDebit` means money moved, or
/// may have when the debit went unanswered, and `compensation` says whether
/// it was restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaOutcome {
    Completed {
        order: OrderRecord,
        total: Money,
        new_balance: Money,
    },
    Rejected {
        reason: SagaError,
    },
    FailedAfterDebit {
        error: SagaError,
        compensation: CompensationStatus,
        wallet_id: WalletId,
        amount: Money,
    },
}

impl SagaOutcome {
    /// Returns the terminal state this outcome corresponds to.
    pub fn state(&self) -> SagaState {
        match self {
            SagaOutcome::Completed { .. } => SagaState::Completed,
            SagaOutcome::Rejected { .. } => SagaState::Rejected,
            SagaOutcome::FailedAfterDebit { .. } => SagaState::FailedAfterDebit,
        }
    }

    /// Returns true if a debit happened, or may have happened, during the saga.
    pub fn money_moved(&self) -> bool {
        !matches!(self, SagaOutcome::Rejected { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SagaOutcome::Completed { .. })
    }

    /// Returns the order record for completed sagas.
    pub fn order(&self) -> Option<&OrderRecord> {
        match self {
            SagaOutcome::Completed { order, .. } => Some(order),
            _ => None,
        }
    }

    /// Returns the compensation status for sagas that failed after debiting.
    pub fn compensation(&self) -> Option<CompensationStatus> {
        match self {
            SagaOutcome::FailedAfterDebit { compensation, .. } => Some(*compensation),
            _ => None,
        }
    }
}
