//! Order creation and order lookup endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{AccountId, Money, ProductId, WalletId};
use saga::{
    CancelHandle, CompensationStatus, IdempotencyKey, OrderRecord, OrderRequest, OrderService,
    ProductCatalog, RequestContext, SagaCoordinator, SagaOutcome, WalletService,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, outcome_status};

/// Header carrying the client-supplied idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Shared application state accessible from all handlers.
pub struct AppState<P, W, O> {
    pub coordinator: SagaCoordinator<P, W, O>,
    pub request_timeout: Duration,
}

impl<P, W, O> AppState<P, W, O> {
    /// Returns a context bounded by the request timeout.
    ///
    /// The handle must live as long as the handler: dropping it (for
    /// example when the client disconnects) cancels the context.
    pub fn request_context(&self) -> (RequestContext, CancelHandle) {
        RequestContext::new(self.request_timeout)
    }
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub product_ids: Vec<String>,
}

// -- Response types --

/// Result of `POST /orders`.
///
/// `status` is `completed`, `rejected` or `failed_after_debit`.
#[derive(Serialize)]
pub struct OrderOutcomeResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cents: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_cents: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensation: Option<CompensationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<WalletId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<Money>,
}

impl From<SagaOutcome> for OrderOutcomeResponse {
    fn from(outcome: SagaOutcome) -> Self {
        let empty = Self {
            status: "",
            order: None,
            total_cents: None,
            balance_cents: None,
            reason: None,
            compensation: None,
            wallet_id: None,
            amount_cents: None,
        };
        match outcome {
            SagaOutcome::Completed {
                order,
                total,
                new_balance,
            } => Self {
                status: "completed",
                order: Some(order),
                total_cents: Some(total),
                balance_cents: Some(new_balance),
                ..empty
            },
            SagaOutcome::Rejected { reason } => Self {
                status: "rejected",
                reason: Some(reason.to_string()),
                ..empty
            },
            SagaOutcome::FailedAfterDebit {
                error,
                compensation,
                wallet_id,
                amount,
            } => Self {
                status: "failed_after_debit",
                reason: Some(error.to_string()),
                compensation: Some(compensation),
                wallet_id: Some(wallet_id),
                amount_cents: Some(amount),
                ..empty
            },
        }
    }
}

// -- Handlers --

/// POST /orders — run the create-order saga.
#[tracing::instrument(skip_all)]
pub async fn create<P, W, O>(
    State(state): State<Arc<AppState<P, W, O>>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderOutcomeResponse>), ApiError>
where
    P: ProductCatalog + 'static,
    W: WalletService + 'static,
    O: OrderService + 'static,
{
    let mut request = OrderRequest::parse(&req.account_id, &req.product_ids)?;
    if let Some(key) = idempotency_key(&headers)? {
        request = request.with_idempotency_key(key);
    }

    let (ctx, _cancel) = state.request_context();
    let outcome = state.coordinator.create_order(&ctx, request).await?;

    let status = outcome_status(&outcome);
    let body = OrderOutcomeResponse::from(outcome);
    metrics::counter!("order_requests_total", "outcome" => body.status).increment(1);

    Ok((status, Json(body)))
}

/// GET /orders/{order_id} — load a single order.
#[tracing::instrument(skip(state))]
pub async fn get<P, W, O>(
    State(state): State<Arc<AppState<P, W, O>>>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderRecord>, ApiError>
where
    P: ProductCatalog + 'static,
    W: WalletService + 'static,
    O: OrderService + 'static,
{
    let order_id = saga::parse_order_id(&order_id)?;
    let (ctx, _cancel) = state.request_context();
    let order = state.coordinator.find_order(&ctx, &order_id).await?;
    Ok(Json(order))
}

/// GET /accounts/{account_id}/orders — list an account's orders.
#[tracing::instrument(skip(state))]
pub async fn by_account<P, W, O>(
    State(state): State<Arc<AppState<P, W, O>>>,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<OrderRecord>>, ApiError>
where
    P: ProductCatalog + 'static,
    W: WalletService + 'static,
    O: OrderService + 'static,
{
    let account_id = AccountId::parse(&account_id)
        .map_err(|_| ApiError::BadRequest("invalid uuid account".to_string()))?;
    let (ctx, _cancel) = state.request_context();
    let orders = state.coordinator.orders_by_account(&ctx, account_id).await?;
    Ok(Json(orders))
}

/// GET /products/{product_id}/orders — list orders containing a product.
#[tracing::instrument(skip(state))]
pub async fn by_product<P, W, O>(
    State(state): State<Arc<AppState<P, W, O>>>,
    Path(product_id): Path<String>,
) -> Result<Json<Vec<OrderRecord>>, ApiError>
where
    P: ProductCatalog + 'static,
    W: WalletService + 'static,
    O: OrderService + 'static,
{
    let product_id = ProductId::parse(&product_id)
        .map_err(|_| ApiError::BadRequest("invalid uuid product".to_string()))?;
    let (ctx, _cancel) = state.request_context();
    let orders = state.coordinator.orders_by_product(&ctx, product_id).await?;
    Ok(Json(orders))
}

// -- Helpers --

fn idempotency_key(headers: &HeaderMap) -> Result<Option<IdempotencyKey>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("Idempotency-Key must be visible ASCII".to_string()))?;
    Ok(Some(IdempotencyKey::parse(raw)?))
}
