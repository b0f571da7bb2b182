//! JSON-over-HTTP clients for the remote product, wallet and order services.

use std::time::Duration;

use async_trait::async_trait;
use common::{AccountId, Money, OrderId, ProductId, WalletId};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::SagaError;
use crate::model::{OrderRecord, Product, WalletHandle};
use crate::services::{OrderService, ProductCatalog, WalletService};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a remote call did not produce a decodable success response.
#[derive(Debug)]
enum CallFailure {
    /// The service answered with a non-success status.
    Status { status: StatusCode, body: String },
    /// The request never left: bad URL or no connection.
    Unsent(String),
    /// The request may have been delivered but no usable answer came back.
    Transport(String),
}

impl CallFailure {
    fn into_unavailable(self, service: &str) -> SagaError {
        match self {
            CallFailure::Status { status, body } => {
                SagaError::unavailable(service, format!("{status}: {body}"))
            }
            CallFailure::Unsent(reason) | CallFailure::Transport(reason) => {
                SagaError::unavailable(service, reason)
            }
        }
    }
}

/// Shared HTTP plumbing for one remote service.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: Url,
    service: &'static str,
}

impl RemoteClient {
    /// Creates a client for `service` rooted at `base_url`.
    pub fn new(service: &'static str, base_url: impl Into<String>) -> Result<Self, SagaError> {
        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                SagaError::Internal(format!("invalid {service} service url: {base_url}"))
            })?;
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SagaError::Internal(format!("failed to build {service} client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            service,
        })
    }

    /// Returns the service name used in errors and logs.
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    ///
    /// Ids come from clients and remote services, so a segment can never
    /// add a path level or climb out of the route it was meant for.
    fn url(&self, segments: &[&str]) -> Result<Url, CallFailure> {
        if let Some(bad) = segments
            .iter()
            .find(|s| matches!(**s, "" | "." | ".."))
        {
            return Err(CallFailure::Unsent(format!("invalid path segment {bad:?}")));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CallFailure::Unsent(format!("invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        segments: &[&str],
    ) -> Result<T, CallFailure> {
        let request = self.http.get(self.url(segments)?).timeout(ctx.remaining());
        Self::send(request).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        segments: &[&str],
        body: &B,
    ) -> Result<T, CallFailure> {
        let request = self
            .http
            .post(self.url(segments)?)
            .timeout(ctx.remaining())
            .json(body);
        Self::send(request).await
    }

    async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, CallFailure> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_builder() {
                CallFailure::Unsent(e.to_string())
            } else {
                CallFailure::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallFailure::Status { status, body });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CallFailure::Transport(format!("invalid response body: {e}")))
    }
}

#[derive(Debug, Serialize)]
struct AmountBody {
    amount_cents: Money,
}

#[derive(Debug, Deserialize)]
struct BalanceBody {
    balance_cents: Money,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    account_id: AccountId,
    product_ids: &'a [ProductId],
}

/// Product catalog backed by the remote product service.
#[derive(Debug, Clone)]
pub struct HttpProductCatalog {
    client: RemoteClient,
}

impl HttpProductCatalog {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SagaError> {
        Ok(Self {
            client: RemoteClient::new("product", base_url)?,
        })
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    async fn find(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
    ) -> Result<Product, SagaError> {
        let id = product_id.to_string();
        self.client
            .get_json(ctx, &["products", id.as_str()])
            .await
            .map_err(|failure| match failure {
                CallFailure::Status {
                    status: StatusCode::NOT_FOUND,
                    ..
                } => SagaError::ProductNotFound(product_id),
                other => other.into_unavailable(self.client.service()),
            })
    }
}

/// Wallet service backed by the remote balance service.
#[derive(Debug, Clone)]
pub struct HttpWalletService {
    client: RemoteClient,
}

impl HttpWalletService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SagaError> {
        Ok(Self {
            client: RemoteClient::new("wallet", base_url)?,
        })
    }
}

#[async_trait]
impl WalletService for HttpWalletService {
    async fn get_wallet_by_account(
        &self,
        ctx: &RequestContext,
        account_id: AccountId,
    ) -> Result<WalletHandle, SagaError> {
        let id = account_id.to_string();
        self.client
            .get_json(ctx, &["wallets", "by-account", id.as_str()])
            .await
            .map_err(|failure| match failure {
                CallFailure::Status {
                    status: StatusCode::NOT_FOUND,
                    ..
                } => SagaError::WalletNotFound(account_id),
                other => other.into_unavailable(self.client.service()),
            })
    }

    async fn debit(
        &self,
        ctx: &RequestContext,
        wallet_id: &WalletId,
        amount: Money,
    ) -> Result<Money, SagaError> {
        let body = AmountBody {
            amount_cents: amount,
        };
        self.client
            .post_json::<_, BalanceBody>(ctx, &["wallets", wallet_id.as_str(), "debit"], &body)
            .await
            .map(|b| b.balance_cents)
            .map_err(|failure| match failure {
                CallFailure::Transport(reason) => SagaError::DebitOutcomeUnknown { reason },
                CallFailure::Status { status, body }
                    if status == StatusCode::CONFLICT
                        || status == StatusCode::UNPROCESSABLE_ENTITY =>
                {
                    match serde_json::from_str::<BalanceBody>(&body) {
                        Ok(current) => SagaError::InsufficientFunds {
                            required: amount,
                            available: current.balance_cents,
                        },
                        Err(_) => SagaError::DebitDeclined(body),
                    }
                }
                CallFailure::Status {
                    status: StatusCode::NOT_FOUND,
                    ..
                } => SagaError::DebitDeclined(format!("wallet {wallet_id} not found")),
                other => other.into_unavailable(self.client.service()),
            })
    }

    async fn credit(
        &self,
        ctx: &RequestContext,
        wallet_id: &WalletId,
        amount: Money,
    ) -> Result<Money, SagaError> {
        let body = AmountBody {
            amount_cents: amount,
        };
        self.client
            .post_json::<_, BalanceBody>(ctx, &["wallets", wallet_id.as_str(), "credit"], &body)
            .await
            .map(|b| b.balance_cents)
            .map_err(|failure| failure.into_unavailable(self.client.service()))
    }
}

/// Order service backed by the remote order service.
#[derive(Debug, Clone)]
pub struct HttpOrderService {
    client: RemoteClient,
}

impl HttpOrderService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SagaError> {
        Ok(Self {
            client: RemoteClient::new("order", base_url)?,
        })
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        segments: &[&str],
    ) -> Result<Vec<OrderRecord>, SagaError> {
        self.client
            .get_json(ctx, segments)
            .await
            .map_err(|failure| failure.into_unavailable(self.client.service()))
    }
}

#[async_trait]
impl OrderService for HttpOrderService {
    async fn create(
        &self,
        ctx: &RequestContext,
        account_id: AccountId,
        product_ids: &[ProductId],
    ) -> Result<OrderRecord, SagaError> {
        let body = CreateOrderBody {
            account_id,
            product_ids,
        };
        self.client
            .post_json(ctx, &["orders"], &body)
            .await
            .map_err(|failure| match failure {
                CallFailure::Status { status, body }
                    if status == StatusCode::BAD_REQUEST
                        || status == StatusCode::UNPROCESSABLE_ENTITY =>
                {
                    SagaError::OrderRejected(body)
                }
                other => other.into_unavailable(self.client.service()),
            })
    }

    async fn find(
        &self,
        ctx: &RequestContext,
        order_id: &OrderId,
    ) -> Result<OrderRecord, SagaError> {
        self.client
            .get_json(ctx, &["orders", order_id.as_str()])
            .await
            .map_err(|failure| match failure {
                CallFailure::Status {
                    status: StatusCode::NOT_FOUND,
                    ..
                } => SagaError::OrderNotFound(order_id.clone()),
                other => other.into_unavailable(self.client.service()),
            })
    }

    async fn find_by_account(
        &self,
        ctx: &RequestContext,
        account_id: AccountId,
    ) -> Result<Vec<OrderRecord>, SagaError> {
        let id = account_id.to_string();
        self.list(ctx, &["orders", "by-account", id.as_str()]).await
    }

    async fn find_by_product(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
    ) -> Result<Vec<OrderRecord>, SagaError> {
        let id = product_id.to_string();
        self.list(ctx, &["orders", "by-product", id.as_str()]).await
    }
}
