//! Product catalog trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, ProductId};
use tokio::sync::RwLock;

use crate::context::RequestContext;
use crate::error::SagaError;
use crate::model::Product;

/// Read access to the remote product service.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Looks up a product and its unit price.
    ///
    /// Fails with `ProductNotFound` when the id is unknown.
    async fn find(&self, ctx: &RequestContext, product_id: ProductId)
    -> Result<Product, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    prices: HashMap<ProductId, Money>,
    lookups: usize,
    unavailable: bool,
}

/// In-memory product catalog for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryProductCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding the given products.
    pub fn with_products(products: impl IntoIterator<Item = (ProductId, Money)>) -> Self {
        let state = InMemoryCatalogState {
            prices: products.into_iter().collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Adds or reprices a product.
    pub async fn insert(&self, product_id: ProductId, price: Money) {
        self.state.write().await.prices.insert(product_id, price);
    }

    /// Makes every lookup fail as if the service were down.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Returns the number of lookups served so far.
    pub async fn lookup_count(&self) -> usize {
        self.state.read().await.lookups
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn find(
        &self,
        _ctx: &RequestContext,
        product_id: ProductId,
    ) -> Result<Product, SagaError> {
        let mut state = self.state.write().await;
        state.lookups += 1;

        if state.unavailable {
            return Err(SagaError::unavailable("product", "connection refused"));
        }

        state
            .prices
            .get(&product_id)
            .map(|price| Product {
                id: product_id,
                price: *price,
            })
            .ok_or(SagaError::ProductNotFound(product_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ctx() -> RequestContext {
        RequestContext::detached(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_find_known_product() {
        let id = ProductId::new();
        let catalog = InMemoryProductCatalog::with_products([(id, Money::from_cents(4000))]);

        let product = catalog.find(&ctx(), id).await.unwrap();
        assert_eq!(product.price, Money::from_cents(4000));
        assert_eq!(catalog.lookup_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let catalog = InMemoryProductCatalog::new();
        let id = ProductId::new();
        assert_eq!(
            catalog.find(&ctx(), id).await.unwrap_err(),
            SagaError::ProductNotFound(id)
        );
    }

    #[tokio::test]
    async fn test_unavailable() {
        let id = ProductId::new();
        let catalog = InMemoryProductCatalog::new();
        catalog.insert(id, Money::from_cents(100)).await;
        catalog.set_unavailable(true).await;
        assert!(catalog.find(&ctx(), id).await.unwrap_err().is_transient());
    }
}
