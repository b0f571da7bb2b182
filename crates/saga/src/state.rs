//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a create-order saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Pricing ──► BalanceCheck ──► Debiting ──► RegisteringOrder ──► Completed
///    │             │               │  │             │
///    └─────────────┴───────────────┘  │             └──► Compensating ──► FailedAfterDebit
///                  ▼                  └──────────────────────────────────────────▲
///               Rejected
/// ```
///
/// `Debiting → FailedAfterDebit` is taken when the debit went unanswered and
/// cannot be compensated blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Resolving product prices into an order total.
    #[default]
    Pricing,

    /// Reading the wallet and comparing the balance under the account lock.
    BalanceCheck,

    /// Issuing the debit.
    Debiting,

    /// Creating the order record after a successful debit.
    RegisteringOrder,

    /// Crediting back a debit whose order could not be registered.
    Compensating,

    /// Order registered and paid for (terminal state).
    Completed,

    /// Stopped before any money moved (terminal state).
    Rejected,

    /// Money was debited but the order failed (terminal state).
    FailedAfterDebit,
}

impl SagaState {
    /// Returns true if the saga may move from `self` to `next`.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        matches!(
            (self, next),
            (Pricing, BalanceCheck)
                | (Pricing, Rejected)
                | (BalanceCheck, Debiting)
                | (BalanceCheck, Rejected)
                | (Debiting, RegisteringOrder)
                | (Debiting, Rejected)
                | (Debiting, FailedAfterDebit)
                | (RegisteringOrder, Completed)
                | (RegisteringOrder, Compensating)
                | (Compensating, FailedAfterDebit)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Rejected | SagaState::FailedAfterDebit
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Pricing => "Pricing",
            SagaState::BalanceCheck => "BalanceCheck",
            SagaState::Debiting => "Debiting",
            SagaState::RegisteringOrder => "RegisteringOrder",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Rejected => "Rejected",
            SagaState::FailedAfterDebit => "FailedAfterDebit",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_pricing() {
        assert_eq!(SagaState::default(), SagaState::Pricing);
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(SagaState::Pricing.can_transition_to(SagaState::BalanceCheck));
        assert!(SagaState::BalanceCheck.can_transition_to(SagaState::Debiting));
        assert!(SagaState::Debiting.can_transition_to(SagaState::RegisteringOrder));
        assert!(SagaState::RegisteringOrder.can_transition_to(SagaState::Completed));
    }

    #[test]
    fn test_rejection_only_before_debit() {
        assert!(SagaState::Pricing.can_transition_to(SagaState::Rejected));
        assert!(SagaState::BalanceCheck.can_transition_to(SagaState::Rejected));
        assert!(SagaState::Debiting.can_transition_to(SagaState::Rejected));
        assert!(!SagaState::RegisteringOrder.can_transition_to(SagaState::Rejected));
        assert!(!SagaState::Compensating.can_transition_to(SagaState::Rejected));
    }

    #[test]
    fn test_compensation_path() {
        assert!(SagaState::RegisteringOrder.can_transition_to(SagaState::Compensating));
        assert!(SagaState::Compensating.can_transition_to(SagaState::FailedAfterDebit));
        assert!(!SagaState::Debiting.can_transition_to(SagaState::Compensating));
        assert!(SagaState::Debiting.can_transition_to(SagaState::FailedAfterDebit));
        assert!(!SagaState::BalanceCheck.can_transition_to(SagaState::FailedAfterDebit));
        assert!(!SagaState::Compensating.can_transition_to(SagaState::Completed));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let all = [
            SagaState::Pricing,
            SagaState::BalanceCheck,
            SagaState::Debiting,
            SagaState::RegisteringOrder,
            SagaState::Compensating,
            SagaState::Completed,
            SagaState::Rejected,
            SagaState::FailedAfterDebit,
        ];
        for terminal in all.iter().filter(|s| s.is_terminal()) {
            for next in all {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaState::BalanceCheck.to_string(), "BalanceCheck");
        assert_eq!(SagaState::FailedAfterDebit.to_string(), "FailedAfterDebit");
    }

    #[test]
    fn test_serialization() {
        let state = SagaState::Compensating;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: SagaState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
