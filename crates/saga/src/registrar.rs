//! Creates and reads order records in the remote order service.

use common::{AccountId, OrderId, ProductId};

use crate::context::RequestContext;
use crate::error::Result;
use crate::model::OrderRecord;
use crate::services::OrderService;

/// Single-call access to the order service. Never retries: whether a retry
/// is safe depends on debit state only the coordinator knows.
#[derive(Debug, Clone)]
pub struct OrderRegistrar<O> {
    orders: O,
}

impl<O: OrderService> OrderRegistrar<O> {
    pub fn new(orders: O) -> Self {
        Self { orders }
    }

    /// Creates the order record.
    #[tracing::instrument(skip(self, ctx, product_ids), fields(%account_id, products = product_ids.len()))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        account_id: AccountId,
        product_ids: &[ProductId],
    ) -> Result<OrderRecord> {
        let record = ctx
            .run("order", self.orders.create(ctx, account_id, product_ids))
            .await?;
        tracing::info!(order_id = %record.order_id, "order registered");
        Ok(record)
    }

    pub async fn find(&self, ctx: &RequestContext, order_id: &OrderId) -> Result<OrderRecord> {
        ctx.run("order", self.orders.find(ctx, order_id)).await
    }

    pub async fn find_by_account(
        &self,
        ctx: &RequestContext,
        account_id: AccountId,
    ) -> Result<Vec<OrderRecord>> {
        ctx.run("order", self.orders.find_by_account(ctx, account_id))
            .await
    }

    pub async fn find_by_product(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
    ) -> Result<Vec<OrderRecord>> {
        ctx.run("order", self.orders.find_by_product(ctx, product_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SagaError;
    use crate::services::InMemoryOrderService;
    use std::time::Duration;

    #[tokio::test]
    async fn test_create_does_not_retry() {
        let orders = InMemoryOrderService::new();
        orders.set_fail_on_create(true).await;
        let registrar = OrderRegistrar::new(orders.clone());
        let ctx = RequestContext::detached(Duration::from_secs(1));

        let err = registrar
            .create(&ctx, AccountId::new(), &[ProductId::new()])
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::RemoteUnavailable { .. }));
        assert_eq!(orders.create_attempts().await, 1);
    }

    #[tokio::test]
    async fn test_read_paths_share_client() {
        let orders = InMemoryOrderService::new();
        let registrar = OrderRegistrar::new(orders);
        let ctx = RequestContext::detached(Duration::from_secs(1));
        let account = AccountId::new();
        let product = ProductId::new();

        let record = registrar.create(&ctx, account, &[product]).await.unwrap();
        assert_eq!(registrar.find(&ctx, &record.order_id).await.unwrap(), record);
        assert_eq!(
            registrar.find_by_account(&ctx, account).await.unwrap(),
            vec![record.clone()]
        );
        assert_eq!(
            registrar.find_by_product(&ctx, product).await.unwrap(),
            vec![record]
        );
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_call() {
        let orders = InMemoryOrderService::new();
        let registrar = OrderRegistrar::new(orders.clone());
        let (ctx, handle) = RequestContext::new(Duration::from_secs(1));
        handle.cancel();

        let err = registrar
            .create(&ctx, AccountId::new(), &[ProductId::new()])
            .await
            .unwrap_err();
        assert_eq!(err, SagaError::Cancelled);
        assert_eq!(orders.create_attempts().await, 0);
    }
}
