//! Saga coordinator for the create-order operation.

use std::sync::Arc;

use common::{AccountId, Money, OrderId, ProductId, WalletId};

use crate::balance::BalanceGateway;
use crate::config::{LockScope, SagaConfig};
use crate::context::RequestContext;
use crate::error::{Result, SagaError};
use crate::escalation::{EscalationSink, LoggingEscalationSink, ReconciliationTicket};
use crate::execution::SagaExecution;
use crate::guard::{AccountLock, SerializationGuard};
use crate::idempotency::{Claim, IdempotencyStore};
use crate::model::{OrderRecord, OrderRequest};
use crate::order_fulfillment;
use crate::outcome::{CompensationStatus, SagaOutcome};
use crate::pricing::PricingAggregator;
use crate::registrar::OrderRegistrar;
use crate::services::{OrderService, ProductCatalog, WalletService};
use crate::state::SagaState;

/// Orchestrates order creation across the product, wallet and order services.
///
/// The saga prices the products, checks and debits the wallet under a
/// per-account lock, then registers the order. If registration fails after
/// the debit, the debited amount is credited back; if that also fails the
/// debit is escalated for manual reconciliation.
///
/// Cloning is cheap; all clones share the same lock table and idempotency
/// store.
pub struct SagaCoordinator<P, W, O> {
    inner: Arc<Inner<P, W, O>>,
}

impl<P, W, O> Clone for SagaCoordinator<P, W, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<P, W, O> {
    pricing: PricingAggregator<P>,
    balance: BalanceGateway<W>,
    registrar: OrderRegistrar<O>,
    guard: SerializationGuard,
    escalation: Arc<dyn EscalationSink>,
    idempotency: IdempotencyStore,
    config: SagaConfig,
}

impl<P, W, O> SagaCoordinator<P, W, O>
where
    P: ProductCatalog + 'static,
    W: WalletService + 'static,
    O: OrderService + 'static,
{
    /// Creates a coordinator that escalates failed compensations to the log.
    pub fn new(catalog: P, wallets: W, orders: O, config: SagaConfig) -> Self {
        Self::with_escalation(
            catalog,
            wallets,
            orders,
            Arc::new(LoggingEscalationSink),
            config,
        )
    }

    /// Creates a coordinator with a custom escalation sink.
    pub fn with_escalation(
        catalog: P,
        wallets: W,
        orders: O,
        escalation: Arc<dyn EscalationSink>,
        config: SagaConfig,
    ) -> Self {
        let idempotency = IdempotencyStore::new(config.idempotency_ttl);
        Self {
            inner: Arc::new(Inner {
                pricing: PricingAggregator::new(catalog),
                balance: BalanceGateway::new(wallets),
                registrar: OrderRegistrar::new(orders),
                guard: SerializationGuard::new(),
                escalation,
                idempotency,
                config,
            }),
        }
    }

    /// Runs the create-order saga.
    ///
    /// Returns `Err` only when the saga never started: an idempotency
    /// conflict or a crashed saga task. Malformed ids are rejected earlier,
    /// by [`OrderRequest::parse`]. Every started saga
    /// ends in an `Ok` outcome that says whether money moved.
    ///
    /// The saga runs on its own task. Dropping the returned future does not
    /// stop it; cancel through `ctx` instead.
    #[tracing::instrument(
        skip(self, ctx, request),
        fields(saga_type = order_fulfillment::SAGA_TYPE, account_id = %request.account_id)
    )]
    pub async fn create_order(
        &self,
        ctx: &RequestContext,
        request: OrderRequest,
    ) -> Result<SagaOutcome> {
        let claim = match &request.idempotency_key {
            Some(key) => {
                match self
                    .inner
                    .idempotency
                    .begin(request.account_id, key, &request.product_ids)?
                {
                    Claim::Fresh(claim) => Some(claim),
                    Claim::Replay(outcome) => {
                        tracing::info!(
                            idempotency_key = %key,
                            state = %outcome.state(),
                            "replaying remembered outcome"
                        );
                        return Ok(outcome);
                    }
                }
            }
            None => None,
        };

        let inner = Arc::clone(&self.inner);
        let ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            let outcome = inner.run(&ctx, request).await;
            if let Some(claim) = claim {
                claim.complete(&outcome);
            }
            outcome
        });

        handle.await.map_err(|e| {
            tracing::error!(error = %e, "saga task failed");
            SagaError::Internal(format!("saga task failed: {e}"))
        })
    }

    /// Looks up a single order.
    pub async fn find_order(&self, ctx: &RequestContext, order_id: &OrderId) -> Result<OrderRecord> {
        self.inner.registrar.find(ctx, order_id).await
    }

    /// Lists the orders placed by an account.
    pub async fn orders_by_account(
        &self,
        ctx: &RequestContext,
        account_id: AccountId,
    ) -> Result<Vec<OrderRecord>> {
        self.inner.registrar.find_by_account(ctx, account_id).await
    }

    /// Lists the orders containing a product.
    pub async fn orders_by_product(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
    ) -> Result<Vec<OrderRecord>> {
        self.inner.registrar.find_by_product(ctx, product_id).await
    }

    /// Returns the per-account lock table.
    pub fn guard(&self) -> &SerializationGuard {
        &self.inner.guard
    }

    /// Returns the idempotency store.
    pub fn idempotency(&self) -> &IdempotencyStore {
        &self.inner.idempotency
    }

    pub fn config(&self) -> &SagaConfig {
        &self.inner.config
    }
}

impl<P, W, O> Inner<P, W, O>
where
    P: ProductCatalog,
    W: WalletService,
    O: OrderService,
{
    /// Drives one saga to a terminal outcome and records metrics.
    #[tracing::instrument(skip_all, fields(saga_id = tracing::field::Empty))]
    async fn run(&self, ctx: &RequestContext, request: OrderRequest) -> SagaOutcome {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = std::time::Instant::now();

        let mut execution = SagaExecution::start(request.account_id);
        tracing::Span::current().record("saga_id", tracing::field::display(execution.saga_id()));

        let outcome = match self.execute(ctx, &request, &mut execution).await {
            Ok(outcome) => outcome,
            Err(e) => self.abort(&mut execution, e).await,
        };

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        let path: Vec<&str> = execution.path().iter().map(|s| s.as_str()).collect();
        match &outcome {
            SagaOutcome::Completed {
                order,
                total,
                new_balance,
            } => {
                metrics::counter!("saga_completed_total").increment(1);
                tracing::info!(
                    order_id = %order.order_id,
                    %total,
                    %new_balance,
                    duration,
                    ?path,
                    "saga completed successfully"
                );
            }
            SagaOutcome::Rejected { reason } => {
                metrics::counter!("saga_rejected_total").increment(1);
                tracing::info!(
                    reason = %reason,
                    total = ?execution.total(),
                    duration,
                    ?path,
                    "saga rejected"
                );
            }
            SagaOutcome::FailedAfterDebit {
                error,
                compensation,
                amount,
                ..
            } => {
                metrics::counter!("saga_failed_after_debit_total").increment(1);
                tracing::warn!(
                    error = %error,
                    %compensation,
                    %amount,
                    duration,
                    ?path,
                    "saga failed after debit"
                );
            }
        }
        tracing::debug!(
            started_at = %execution.started_at(),
            transitions = ?execution.transitions(),
            order_id = ?execution.order_id(),
            failure = ?execution.failure_reason(),
            "saga execution finished"
        );
        outcome
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        request: &OrderRequest,
        execution: &mut SagaExecution,
    ) -> Result<SagaOutcome> {
        // 1. Pricing
        tracing::debug!(step = order_fulfillment::STEP_PRICE, "saga step started");
        let priced = match self.pricing.price_order(ctx, request).await {
            Ok(priced) => priced,
            Err(e) => return Self::reject(execution, e),
        };
        let account_id = priced.account_id;
        let total = priced.total_amount;
        execution.record_total(total);

        // 2. Per-account lock
        let lock = match self.lock_account(ctx, account_id).await {
            Ok(lock) => lock,
            Err(e) => return Self::reject(execution, e),
        };

        // 3. Balance check
        execution.advance(SagaState::BalanceCheck)?;
        tracing::debug!(step = order_fulfillment::STEP_BALANCE_CHECK, "saga step started");
        let wallet = match self.balance.get_wallet(ctx, account_id).await {
            Ok(wallet) => wallet,
            Err(e) => return Self::reject(execution, e),
        };
        execution.record_wallet(wallet.wallet_id.clone());
        if wallet.balance < total {
            return Self::reject(
                execution,
                SagaError::InsufficientFunds {
                    required: total,
                    available: wallet.balance,
                },
            );
        }

        // 4. Debit. Once sent it is not abandoned on cancellation, since a
        // cancelled-but-applied debit would go uncompensated.
        execution.advance(SagaState::Debiting)?;
        tracing::info!(step = order_fulfillment::STEP_DEBIT, %total, "saga step started");
        let new_balance = match self.balance.debit(ctx, &wallet.wallet_id, total).await {
            Ok(balance) => balance,
            Err(e @ SagaError::DebitOutcomeUnknown { .. }) => {
                return self
                    .debit_unconfirmed(execution, &wallet.wallet_id, total, e)
                    .await;
            }
            Err(e) => return Self::reject(execution, e),
        };
        execution.record_debit(total);

        // 5. Order registration
        execution.advance(SagaState::RegisteringOrder)?;
        let lock = match self.config.lock_scope {
            LockScope::ThroughRegistration => Some(lock),
            LockScope::DebitOnly => {
                drop(lock);
                None
            }
        };
        tracing::debug!(step = order_fulfillment::STEP_REGISTER_ORDER, "saga step started");
        let registered = self
            .registrar
            .create(ctx, account_id, &priced.product_ids)
            .await;

        let outcome = match registered {
            Ok(order) => {
                execution.record_order(order.order_id.clone());
                execution.advance(SagaState::Completed)?;
                SagaOutcome::Completed {
                    order,
                    total,
                    new_balance,
                }
            }
            Err(e) => {
                self.compensate(execution, &wallet.wallet_id, total, e)
                    .await?
            }
        };
        // Held until the compensating credit has landed, so the next saga on
        // this account reads the restored balance.
        drop(lock);
        Ok(outcome)
    }

    /// Waits for the account lock, bounded by the request's deadline and cancellation.
    async fn lock_account(&self, ctx: &RequestContext, account_id: AccountId) -> Result<AccountLock> {
        if ctx.is_cancelled() {
            return Err(SagaError::Cancelled);
        }
        tokio::select! {
            biased;
            () = ctx.cancelled() => Err(SagaError::Cancelled),
            lock = tokio::time::timeout_at(ctx.deadline(), self.guard.acquire(account_id)) => {
                lock.map_err(|_| SagaError::unavailable("wallet", "deadline exceeded waiting for account lock"))
            }
        }
    }

    fn reject(execution: &mut SagaExecution, reason: SagaError) -> Result<SagaOutcome> {
        execution.advance(SagaState::Rejected)?;
        execution.record_failure(reason.to_string());
        Ok(SagaOutcome::Rejected { reason })
    }

    /// Credits the debited amount back after a failed registration.
    ///
    /// Runs on a detached context so it completes even if the inbound
    /// request was cancelled or timed out.
    #[tracing::instrument(skip(self, execution, error), fields(%wallet_id, %amount))]
    async fn compensate(
        &self,
        execution: &mut SagaExecution,
        wallet_id: &WalletId,
        amount: Money,
        error: SagaError,
    ) -> Result<SagaOutcome> {
        execution.advance(SagaState::Compensating)?;
        execution.record_failure(error.to_string());
        tracing::warn!(
            step = order_fulfillment::STEP_COMPENSATE_CREDIT,
            error = %error,
            "order registration failed after debit, compensating"
        );

        let comp_ctx = RequestContext::detached(self.config.compensation_timeout);
        let credited = self.balance.credit(&comp_ctx, wallet_id, amount).await;
        execution.advance(SagaState::FailedAfterDebit)?;

        let compensation = match credited {
            Ok(balance) => {
                tracing::info!(%balance, "compensation succeeded");
                CompensationStatus::Reconciled
            }
            Err(credit_error) => {
                metrics::counter!("saga_compensation_failed_total").increment(1);
                let failure = SagaError::CompensationFailed {
                    step: order_fulfillment::STEP_COMPENSATE_CREDIT.to_string(),
                    reason: credit_error.to_string(),
                };
                tracing::error!(error = %failure, "compensation failed");
                self.escalate(
                    execution,
                    wallet_id,
                    amount,
                    error.to_string(),
                    credit_error.to_string(),
                )
                .await;
                CompensationStatus::PendingManualReconciliation
            }
        };

        Ok(SagaOutcome::FailedAfterDebit {
            error,
            compensation,
            wallet_id: wallet_id.clone(),
            amount,
        })
    }

    /// Ends a saga whose debit went unanswered.
    ///
    /// The wallet may or may not have been charged. A blind credit could pay
    /// out money that was never taken, so the debit goes straight to manual
    /// reconciliation.
    async fn debit_unconfirmed(
        &self,
        execution: &mut SagaExecution,
        wallet_id: &WalletId,
        amount: Money,
        error: SagaError,
    ) -> Result<SagaOutcome> {
        execution.advance(SagaState::FailedAfterDebit)?;
        execution.record_failure(error.to_string());
        metrics::counter!("saga_debit_unconfirmed_total").increment(1);
        tracing::error!(error = %error, %wallet_id, %amount, "debit outcome unknown");
        self.escalate(
            execution,
            wallet_id,
            amount,
            error.to_string(),
            "no credit attempted: debit outcome unknown".to_string(),
        )
        .await;

        Ok(SagaOutcome::FailedAfterDebit {
            error,
            compensation: CompensationStatus::PendingManualReconciliation,
            wallet_id: wallet_id.clone(),
            amount,
        })
    }

    /// Ends a saga whose state machine refused a transition.
    ///
    /// The transitions are fixed in code so this should not happen; if it
    /// does after a debit, the debit is escalated rather than dropped.
    async fn abort(&self, execution: &mut SagaExecution, error: SagaError) -> SagaOutcome {
        tracing::error!(error = %error, state = %execution.state(), "saga aborted");
        execution.record_failure(error.to_string());
        match (execution.wallet_id().cloned(), execution.debited()) {
            (Some(wallet_id), Some(amount)) => {
                metrics::counter!("saga_compensation_failed_total").increment(1);
                self.escalate(
                    execution,
                    &wallet_id,
                    amount,
                    error.to_string(),
                    "no credit attempted: saga aborted".to_string(),
                )
                .await;
                SagaOutcome::FailedAfterDebit {
                    error,
                    compensation: CompensationStatus::PendingManualReconciliation,
                    wallet_id,
                    amount,
                }
            }
            _ => SagaOutcome::Rejected { reason: error },
        }
    }

    /// Hands a debit nobody could give back to the escalation sink.
    async fn escalate(
        &self,
        execution: &SagaExecution,
        wallet_id: &WalletId,
        amount: Money,
        order_error: String,
        credit_error: String,
    ) {
        self.escalation
            .escalate(ReconciliationTicket {
                saga_id: execution.saga_id(),
                account_id: execution.account_id(),
                wallet_id: wallet_id.clone(),
                amount,
                order_error,
                credit_error,
                raised_at: chrono::Utc::now(),
            })
            .await;
    }
}
