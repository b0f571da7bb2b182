//! HTTP façade for the order saga.
//!
//! Exposes order creation and order lookups over REST, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    HttpOrderService, HttpProductCatalog, HttpWalletService, InMemoryOrderService,
    InMemoryProductCatalog, InMemoryWalletService, OrderService, ProductCatalog, SagaCoordinator,
    SagaError, WalletService,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::{Config, RemoteServiceUrls};
use routes::orders::AppState;

/// State backed by in-memory services.
pub type InMemoryState = AppState<InMemoryProductCatalog, InMemoryWalletService, InMemoryOrderService>;

/// State backed by the remote HTTP services.
pub type RemoteState = AppState<HttpProductCatalog, HttpWalletService, HttpOrderService>;

/// Handles to the in-memory services behind an [`InMemoryState`], for seeding and inspection.
#[derive(Debug, Clone)]
pub struct InMemoryServices {
    pub catalog: InMemoryProductCatalog,
    pub wallets: InMemoryWalletService,
    pub orders: InMemoryOrderService,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<P, W, O>(state: Arc<AppState<P, W, O>>, metrics_handle: PrometheusHandle) -> Router
where
    P: ProductCatalog + 'static,
    W: WalletService + 'static,
    O: OrderService + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<P, W, O>))
        .route("/orders/{order_id}", get(routes::orders::get::<P, W, O>))
        .route(
            "/accounts/{account_id}/orders",
            get(routes::orders::by_account::<P, W, O>),
        )
        .route(
            "/products/{product_id}/orders",
            get(routes::orders::by_product::<P, W, O>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state on top of in-memory services.
pub fn create_default_state(config: &Config) -> (Arc<InMemoryState>, InMemoryServices) {
    let services = InMemoryServices {
        catalog: InMemoryProductCatalog::new(),
        wallets: InMemoryWalletService::new(),
        orders: InMemoryOrderService::new(),
    };
    let coordinator = SagaCoordinator::new(
        services.catalog.clone(),
        services.wallets.clone(),
        services.orders.clone(),
        config.saga_config(),
    );
    let state = Arc::new(AppState {
        coordinator,
        request_timeout: config.request_timeout,
    });
    (state, services)
}

/// Creates application state that talks to the remote services.
pub fn create_remote_state(
    config: &Config,
    urls: &RemoteServiceUrls,
) -> Result<Arc<RemoteState>, SagaError> {
    let coordinator = SagaCoordinator::new(
        HttpProductCatalog::new(urls.product.as_str())?,
        HttpWalletService::new(urls.wallet.as_str())?,
        HttpOrderService::new(urls.order.as_str())?,
        config.saga_config(),
    );
    Ok(Arc::new(AppState {
        coordinator,
        request_timeout: config.request_timeout,
    }))
}
