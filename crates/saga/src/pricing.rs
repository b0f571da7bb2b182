//! Resolves product ids into an order total.

use common::{Money, ProductId};

use crate::context::RequestContext;
use crate::error::{Result, SagaError};
use crate::model::{OrderRequest, PricedOrder};
use crate::services::ProductCatalog;

/// Sums unit prices from the product service.
///
/// Pure with respect to the rest of the system: no side effects, safe to retry.
#[derive(Debug, Clone)]
pub struct PricingAggregator<P> {
    catalog: P,
}

impl<P: ProductCatalog> PricingAggregator<P> {
    pub fn new(catalog: P) -> Self {
        Self { catalog }
    }

    /// Returns the total price of `product_ids`, one unit per occurrence.
    ///
    /// Stops at the first unresolvable id; no partial total is returned.
    /// Overflow of the monetary range is an error, never a wrap.
    #[tracing::instrument(skip(self, ctx, product_ids), fields(products = product_ids.len()))]
    pub async fn price(&self, ctx: &RequestContext, product_ids: &[ProductId]) -> Result<Money> {
        let mut total = Money::zero();
        for &product_id in product_ids {
            let product = ctx
                .run("product", self.catalog.find(ctx, product_id))
                .await?;
            if product.price.is_negative() {
                return Err(SagaError::unavailable(
                    "product",
                    format!("negative price for product {product_id}"),
                ));
            }
            total = total
                .checked_add(product.price)
                .ok_or(SagaError::AmountOverflow)?;
        }
        tracing::debug!(%total, "order priced");
        Ok(total)
    }

    /// Prices a whole request.
    pub async fn price_order(
        &self,
        ctx: &RequestContext,
        request: &OrderRequest,
    ) -> Result<PricedOrder> {
        let total_amount = self.price(ctx, &request.product_ids).await?;
        Ok(PricedOrder {
            account_id: request.account_id,
            product_ids: request.product_ids.clone(),
            total_amount,
        })
    }
}
