//! Order service trait and in-memory implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{AccountId, OrderId, ProductId};
use tokio::sync::RwLock;

use crate::context::RequestContext;
use crate::error::SagaError;
use crate::model::OrderRecord;

/// Access to the remote order service.
///
/// Only `create` is on the saga's write path; the read operations share
/// the same client.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Creates the durable order record.
    async fn create(
        &self,
        ctx: &RequestContext,
        account_id: AccountId,
        product_ids: &[ProductId],
    ) -> Result<OrderRecord, SagaError>;

    /// Loads an order by id.
    async fn find(&self, ctx: &RequestContext, order_id: &OrderId)
    -> Result<OrderRecord, SagaError>;

    /// Lists the orders placed by an account.
    async fn find_by_account(
        &self,
        ctx: &RequestContext,
        account_id: AccountId,
    ) -> Result<Vec<OrderRecord>, SagaError>;

    /// Lists the orders containing a product.
    async fn find_by_product(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
    ) -> Result<Vec<OrderRecord>, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: Vec<OrderRecord>,
    create_attempts: usize,
    fail_on_create: bool,
    create_latency: Option<Duration>,
}

/// In-memory order service for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderService {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderService {
    /// Creates an empty order service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every create call to fail with a transport error.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Delays every create call.
    pub async fn set_create_latency(&self, latency: Option<Duration>) {
        self.state.write().await.create_latency = latency;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns how many create calls were received, including failed ones.
    pub async fn create_attempts(&self) -> usize {
        self.state.read().await.create_attempts
    }
}

#[async_trait]
impl OrderService for InMemoryOrderService {
    async fn create(
        &self,
        _ctx: &RequestContext,
        account_id: AccountId,
        product_ids: &[ProductId],
    ) -> Result<OrderRecord, SagaError> {
        let latency = {
            let mut state = self.state.write().await;
            state.create_attempts += 1;
            state.create_latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.write().await;
        if state.fail_on_create {
            return Err(SagaError::unavailable("order", "connection refused"));
        }

        let record = OrderRecord {
            order_id: OrderId::new(uuid::Uuid::new_v4().to_string()),
            account_id,
            product_ids: product_ids.to_vec(),
            created_at: Utc::now(),
        };
        state.orders.push(record.clone());

        Ok(record)
    }

    async fn find(
        &self,
        _ctx: &RequestContext,
        order_id: &OrderId,
    ) -> Result<OrderRecord, SagaError> {
        self.state
            .read()
            .await
            .orders
            .iter()
            .find(|o| &o.order_id == order_id)
            .cloned()
            .ok_or_else(|| SagaError::OrderNotFound(order_id.clone()))
    }

    async fn find_by_account(
        &self,
        _ctx: &RequestContext,
        account_id: AccountId,
    ) -> Result<Vec<OrderRecord>, SagaError> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .iter()
            .filter(|o| o.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn find_by_product(
        &self,
        _ctx: &RequestContext,
        product_id: ProductId,
    ) -> Result<Vec<OrderRecord>, SagaError> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .iter()
            .filter(|o| o.product_ids.contains(&product_id))
            .cloned()
            .collect())
    }
}
