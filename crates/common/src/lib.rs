//! Shared identifiers and the monetary type used across the order saga crates.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{AccountId, OrderId, ProductId, SagaId, WalletId};
