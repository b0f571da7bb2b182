//! Values that flow through a single saga execution.

use chrono::{DateTime, Utc};
use common::{AccountId, Money, OrderId, ProductId, WalletId};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// Client-supplied token that makes a retried create-order request safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Longest accepted key.
    pub const MAX_LEN: usize = 128;

    /// Validates and wraps a key.
    pub fn parse(raw: impl Into<String>) -> Result<Self, SagaError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SagaError::Validation("idempotency key empty".to_string()));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(SagaError::Validation(format!(
                "idempotency key longer than {} characters",
                Self::MAX_LEN
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request to create an order for an account.
///
/// `product_ids` keeps the caller's order and may contain duplicates;
/// each occurrence is priced and charged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub account_id: AccountId,
    pub product_ids: Vec<ProductId>,
    pub idempotency_key: Option<IdempotencyKey>,
}

impl OrderRequest {
    /// Creates a request without an idempotency key.
    pub fn new(account_id: AccountId, product_ids: Vec<ProductId>) -> Self {
        Self {
            account_id,
            product_ids,
            idempotency_key: None,
        }
    }

    /// Parses a request from raw strings, as received over HTTP.
    pub fn parse(account_id: &str, product_ids: &[String]) -> Result<Self, SagaError> {
        if account_id.trim().is_empty() {
            return Err(SagaError::Validation("account id empty".to_string()));
        }
        let account_id = AccountId::parse(account_id)
            .map_err(|_| SagaError::Validation("invalid uuid account".to_string()))?;
        let product_ids = product_ids
            .iter()
            .map(|raw| {
                ProductId::parse(raw)
                    .map_err(|_| SagaError::Validation(format!("invalid uuid product: {raw}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(account_id, product_ids))
    }

    /// Attaches an idempotency key.
    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

/// Parses an order id received from a client.
///
/// The order service issues uuids; anything else is rejected before it can
/// reach a remote URL.
pub fn parse_order_id(raw: &str) -> Result<OrderId, SagaError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SagaError::Validation("order id empty".to_string()));
    }
    let uuid = uuid::Uuid::parse_str(raw)
        .map_err(|_| SagaError::Validation("invalid uuid order".to_string()))?;
    Ok(OrderId::new(uuid.to_string()))
}

/// An order request together with its computed total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    pub account_id: AccountId,
    pub product_ids: Vec<ProductId>,
    pub total_amount: Money,
}

/// A product as returned by the product service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(rename = "price_cents")]
    pub price: Money,
}

/// Point-in-time snapshot of a wallet. Stale as soon as any debit or credit happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletHandle {
    pub wallet_id: WalletId,
    pub account_id: AccountId,
    #[serde(rename = "balance_cents")]
    pub balance: Money,
}

/// An order record owned by the remote order service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub product_ids: Vec<ProductId>,
    pub created_at: DateTime<Utc>,
}
