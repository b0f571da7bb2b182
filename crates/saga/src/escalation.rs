//! Escalation of debits whose compensating credit failed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AccountId, Money, SagaId, WalletId};
use serde::Serialize;
use tokio::sync::Mutex;

/// Everything an operator needs to settle a debit that was never credited back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationTicket {
    pub saga_id: SagaId,
    pub account_id: AccountId,
    pub wallet_id: WalletId,
    pub amount: Money,
    /// Why the order could not be registered.
    pub order_error: String,
    /// Why the credit-back failed.
    pub credit_error: String,
    pub raised_at: DateTime<Utc>,
}

/// Receives reconciliation tickets. Called exactly once per failed compensation.
#[async_trait]
pub trait EscalationSink: Send + Sync {
    async fn escalate(&self, ticket: ReconciliationTicket);
}

fn log_ticket(ticket: &ReconciliationTicket) {
    tracing::error!(
        saga_id = %ticket.saga_id,
        account_id = %ticket.account_id,
        wallet_id = %ticket.wallet_id,
        amount = %ticket.amount,
        order_error = %ticket.order_error,
        credit_error = %ticket.credit_error,
        "compensation failed, debit requires manual reconciliation"
    );
}

/// Logs tickets at error level and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEscalationSink;

#[async_trait]
impl EscalationSink for LoggingEscalationSink {
    async fn escalate(&self, ticket: ReconciliationTicket) {
        log_ticket(&ticket);
    }
}

/// Logs tickets and keeps them queued for manual reconciliation.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationQueue {
    tickets: Arc<Mutex<Vec<ReconciliationTicket>>>,
}

impl ReconciliationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the queued tickets without removing them.
    pub async fn pending(&self) -> Vec<ReconciliationTicket> {
        self.tickets.lock().await.clone()
    }

    /// Removes and returns every queued ticket.
    pub async fn take(&self) -> Vec<ReconciliationTicket> {
        std::mem::take(&mut *self.tickets.lock().await)
    }
}

#[async_trait]
impl EscalationSink for ReconciliationQueue {
    async fn escalate(&self, ticket: ReconciliationTicket) {
        log_ticket(&ticket);
        self.tickets.lock().await.push(ticket);
    }
}
