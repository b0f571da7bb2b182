//! Order fulfillment saga.
//!
//! Creating an order spans three independently failing services: the
//! product catalog, the account's wallet and the order service. There is no
//! shared transaction, so the coordinator keeps money conserved with ordered
//! steps, a per-account lock and a compensating credit:
//!
//! 1. Price the requested products
//! 2. Check the wallet balance and debit it (under the account lock)
//! 3. Register the order
//!
//! If registration fails after the debit, the amount is credited back. If
//! the credit fails too, the debit is escalated for manual reconciliation.

pub mod balance;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod escalation;
pub mod execution;
pub mod guard;
pub mod idempotency;
pub mod model;
pub mod order_fulfillment;
pub mod outcome;
pub mod pricing;
pub mod registrar;
pub mod services;
pub mod state;

pub use balance::BalanceGateway;
pub use config::{LockScope, SagaConfig};
pub use context::{CancelHandle, RequestContext};
pub use coordinator::SagaCoordinator;
pub use error::SagaError;
pub use escalation::{
    EscalationSink, LoggingEscalationSink, ReconciliationQueue, ReconciliationTicket,
};
pub use execution::{SagaExecution, Transition};
pub use guard::{AccountLock, SerializationGuard};
pub use idempotency::{Claim, IdempotencyClaim, IdempotencyStore};
pub use model::{
    IdempotencyKey, OrderRecord, OrderRequest, PricedOrder, Product, WalletHandle, parse_order_id,
};
pub use outcome::{CompensationStatus, SagaOutcome};
pub use pricing::PricingAggregator;
pub use registrar::OrderRegistrar;
pub use services::{
    HttpOrderService, HttpProductCatalog, HttpWalletService, InMemoryOrderService,
    InMemoryProductCatalog, InMemoryWalletService, OrderService, ProductCatalog, RemoteClient,
    WalletService,
};
pub use state::SagaState;
