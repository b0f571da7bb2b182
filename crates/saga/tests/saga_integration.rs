//! Integration tests for the create-order saga.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use common::{AccountId, Money, ProductId};
use saga::{
    CompensationStatus, HttpOrderService, HttpProductCatalog, HttpWalletService, IdempotencyKey,
    InMemoryOrderService, InMemoryProductCatalog, InMemoryWalletService, OrderRequest,
    ReconciliationQueue, RequestContext, SagaConfig, SagaCoordinator, SagaError, SagaOutcome,
    SagaState,
};

type TestCoordinator =
    SagaCoordinator<InMemoryProductCatalog, InMemoryWalletService, InMemoryOrderService>;

struct TestHarness {
    coordinator: TestCoordinator,
    catalog: InMemoryProductCatalog,
    wallets: InMemoryWalletService,
    orders: InMemoryOrderService,
    reconciliation: ReconciliationQueue,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(SagaConfig::default())
    }

    fn with_config(config: SagaConfig) -> Self {
        let catalog = InMemoryProductCatalog::new();
        let wallets = InMemoryWalletService::new();
        let orders = InMemoryOrderService::new();
        let reconciliation = ReconciliationQueue::new();

        let coordinator = SagaCoordinator::with_escalation(
            catalog.clone(),
            wallets.clone(),
            orders.clone(),
            Arc::new(reconciliation.clone()),
            config,
        );

        Self {
            coordinator,
            catalog,
            wallets,
            orders,
            reconciliation,
        }
    }

    async fn product(&self, cents: i64) -> ProductId {
        let id = ProductId::new();
        self.catalog.insert(id, Money::from_cents(cents)).await;
        id
    }

    async fn account(&self, cents: i64) -> AccountId {
        let account = AccountId::new();
        self.wallets
            .open_wallet(account, Money::from_cents(cents))
            .await;
        account
    }

    async fn balance(&self, account: AccountId) -> Money {
        self.wallets.balance_of(account).await.unwrap()
    }

    async fn place(&self, account: AccountId, products: Vec<ProductId>) -> SagaOutcome {
        self.coordinator
            .create_order(&ctx(), OrderRequest::new(account, products))
            .await
            .unwrap()
    }
}

fn ctx() -> RequestContext {
    RequestContext::detached(Duration::from_secs(5))
}

#[tokio::test]
async fn test_scenario_completed_order_leaves_remaining_balance() {
    let h = TestHarness::new();
    let account = h.account(10_000).await;
    let p1 = h.product(4_000).await;
    let p2 = h.product(3_000).await;

    let outcome = h.place(account, vec![p1, p2]).await;

    assert_eq!(outcome.state(), SagaState::Completed);
    assert_eq!(h.balance(account).await, Money::from_cents(3_000));
    assert_eq!(
        h.wallets.debits().await.iter().map(|(_, a)| *a).collect::<Vec<_>>(),
        vec![Money::from_cents(7_000)]
    );
}

#[tokio::test]
async fn test_scenario_insufficient_funds_keeps_balance() {
    let h = TestHarness::new();
    let account = h.account(1_000).await;
    let p1 = h.product(4_000).await;

    let outcome = h.place(account, vec![p1]).await;

    assert!(matches!(
        outcome,
        SagaOutcome::Rejected {
            reason: SagaError::InsufficientFunds { .. }
        }
    ));
    assert!(!outcome.money_moved());
    assert_eq!(h.balance(account).await, Money::from_cents(1_000));
}

#[tokio::test]
async fn test_scenario_order_service_down_is_reconciled() {
    let h = TestHarness::new();
    let account = h.account(10_000).await;
    let p1 = h.product(4_000).await;
    let p2 = h.product(3_000).await;
    h.orders.set_fail_on_create(true).await;

    let outcome = h.place(account, vec![p1, p2]).await;

    match outcome {
        SagaOutcome::FailedAfterDebit {
            error,
            compensation,
            amount,
            ..
        } => {
            assert!(matches!(error, SagaError::RemoteUnavailable { .. }));
            assert_eq!(compensation, CompensationStatus::Reconciled);
            assert_eq!(amount, Money::from_cents(7_000));
        }
        other => panic!("expected failed after debit, got {other:?}"),
    }
    assert_eq!(h.balance(account).await, Money::from_cents(10_000));
}

#[tokio::test]
async fn test_successful_saga_conserves_money() {
    let h = TestHarness::new();
    let account = h.account(5_000).await;
    let p1 = h.product(1_250).await;
    let p2 = h.product(999).await;
    let products = vec![p1, p2, p1];

    let before = h.balance(account).await;
    let outcome = h.place(account, products.clone()).await;

    let SagaOutcome::Completed {
        order,
        total,
        new_balance,
    } = outcome
    else {
        panic!("expected completed");
    };
    assert_eq!(before.checked_sub(total), Some(new_balance));
    assert_eq!(h.balance(account).await, new_balance);
    assert_eq!(order.product_ids, products);

    let stored = h
        .coordinator
        .find_order(&ctx(), &order.order_id)
        .await
        .unwrap();
    assert_eq!(stored.product_ids, products);
}

#[tokio::test]
async fn test_rejection_issues_no_debit() {
    let h = TestHarness::new();
    let account = h.account(2_999).await;
    let p1 = h.product(3_000).await;

    h.place(account, vec![p1]).await;

    assert_eq!(h.wallets.debit_attempts().await, 0);
    assert_eq!(h.orders.create_attempts().await, 0);
    assert_eq!(h.balance(account).await, Money::from_cents(2_999));
}

#[tokio::test]
async fn test_compensation_restores_exact_balance() {
    let h = TestHarness::new();
    let account = h.account(8_888).await;
    let p1 = h.product(1_111).await;
    h.orders.set_fail_on_create(true).await;

    let outcome = h.place(account, vec![p1, p1, p1]).await;

    assert_eq!(outcome.compensation(), Some(CompensationStatus::Reconciled));
    assert_eq!(h.balance(account).await, Money::from_cents(8_888));
    let debits = h.wallets.debits().await;
    assert_eq!(debits, h.wallets.credits().await);
    assert!(h.reconciliation.pending().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_accept_only_what_fits() {
    let h = TestHarness::new();
    let account = h.account(10_000).await;
    h.wallets.set_allow_overdraft(true).await;
    h.wallets.set_latency(Some(Duration::from_millis(5))).await;
    let cheap = h.product(1_500).await;
    let pricey = h.product(4_000).await;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let coordinator = h.coordinator.clone();
        let product = if i % 2 == 0 { cheap } else { pricey };
        tasks.push(tokio::spawn(async move {
            coordinator
                .create_order(&ctx(), OrderRequest::new(account, vec![product]))
                .await
                .unwrap()
        }));
    }

    let mut accepted = Money::zero();
    for task in tasks {
        if let SagaOutcome::Completed { total, .. } = task.await.unwrap() {
            accepted = accepted.checked_add(total).unwrap();
        }
    }

    let balance = h.balance(account).await;
    assert!(!balance.is_negative());
    assert_eq!(Money::from_cents(10_000).checked_sub(accepted), Some(balance));
    assert_eq!(h.coordinator.guard().active_accounts(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_other_accounts_progress_while_one_is_busy() {
    let h = TestHarness::new();
    let busy = h.account(10_000).await;
    let idle = h.account(10_000).await;
    let p1 = h.product(100).await;

    let _held = h.coordinator.guard().acquire(busy).await;

    let outcome = tokio::time::timeout(Duration::from_secs(2), h.place(idle, vec![p1]))
        .await
        .expect("unrelated account must not wait");
    assert!(outcome.is_completed());
}

#[tokio::test]
async fn test_failed_compensation_escalates_exactly_once() {
    let h = TestHarness::new();
    let account = h.account(10_000).await;
    let p1 = h.product(7_000).await;
    h.orders.set_fail_on_create(true).await;
    h.wallets.set_fail_on_credit(true).await;

    let outcome = h.place(account, vec![p1]).await;

    assert_eq!(
        outcome.compensation(),
        Some(CompensationStatus::PendingManualReconciliation)
    );
    assert_eq!(h.wallets.credit_attempts().await, 1);
    let tickets = h.reconciliation.take().await;
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].account_id, account);
    assert_eq!(tickets[0].amount, Money::from_cents(7_000));
    assert!(h.reconciliation.pending().await.is_empty());
    assert_eq!(h.balance(account).await, Money::from_cents(3_000));
}

#[tokio::test]
async fn test_idempotency_key_prevents_double_debit() {
    let h = TestHarness::new();
    let account = h.account(10_000).await;
    let p1 = h.product(2_000).await;
    let request = OrderRequest::new(account, vec![p1])
        .with_idempotency_key(IdempotencyKey::parse("client-retry-7").unwrap());

    for _ in 0..3 {
        let outcome = h
            .coordinator
            .create_order(&ctx(), request.clone())
            .await
            .unwrap();
        assert!(outcome.is_completed());
    }

    assert_eq!(h.wallets.debit_attempts().await, 1);
    assert_eq!(h.balance(account).await, Money::from_cents(8_000));
}

#[tokio::test]
async fn test_rejected_idempotent_request_can_be_retried() {
    let h = TestHarness::new();
    let account = h.account(1_000).await;
    let p1 = h.product(2_000).await;
    let request = OrderRequest::new(account, vec![p1])
        .with_idempotency_key(IdempotencyKey::parse("top-up-then-retry").unwrap());

    let first = h
        .coordinator
        .create_order(&ctx(), request.clone())
        .await
        .unwrap();
    assert!(!first.money_moved());

    let second = h.coordinator.create_order(&ctx(), request).await.unwrap();
    assert!(!second.money_moved());
    assert_eq!(h.catalog.lookup_count().await, 2);
}

#[tokio::test]
async fn test_malformed_ids_fail_before_any_call() {
    let h = TestHarness::new();

    let err = OrderRequest::parse("not-a-uuid", &[]).unwrap_err();
    assert_eq!(err, SagaError::Validation("invalid uuid account".to_string()));

    let err = OrderRequest::parse(&AccountId::new().to_string(), &["p1".to_string()]).unwrap_err();
    assert!(matches!(err, SagaError::Validation(_)));
    assert_eq!(h.catalog.lookup_count().await, 0);
    assert_eq!(h.wallets.debit_attempts().await, 0);
}

#[tokio::test]
async fn test_empty_order_is_registered_at_zero_cost() {
    let h = TestHarness::new();
    let account = h.account(1_000).await;

    let outcome = h.place(account, vec![]).await;

    assert!(outcome.is_completed());
    assert_eq!(h.balance(account).await, Money::from_cents(1_000));
    assert_eq!(h.orders.create_attempts().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_deadline_rejects_without_debit() {
    let h = TestHarness::new();
    let account = h.account(10_000).await;
    let p1 = h.product(100).await;
    h.wallets.set_latency(Some(Duration::from_secs(10))).await;

    let (ctx, _handle) = RequestContext::new(Duration::from_secs(1));
    let outcome = h
        .coordinator
        .create_order(&ctx, OrderRequest::new(account, vec![p1]))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        SagaOutcome::Rejected {
            reason: SagaError::RemoteUnavailable { .. }
        }
    ));
    assert_eq!(h.wallets.debit_attempts().await, 0);
}

// --- Remote services over HTTP ---

#[derive(Default)]
struct FakeServices {
    prices: HashMap<String, i64>,
    wallets: HashMap<String, (String, i64)>,
    orders: Vec<serde_json::Value>,
    fail_orders: bool,
}

type Shared = Arc<Mutex<FakeServices>>;

fn fake_router(state: Shared) -> Router {
    Router::new()
        .route(
            "/products/{id}",
            get(
                |State(s): State<Shared>, Path(id): Path<String>| async move {
                    let s = s.lock().unwrap();
                    match s.prices.get(&id) {
                        Some(price) => {
                            Ok(Json(serde_json::json!({ "id": id, "price_cents": price })))
                        }
                        None => Err(StatusCode::NOT_FOUND),
                    }
                },
            ),
        )
        .route(
            "/wallets/by-account/{account}",
            get(
                |State(s): State<Shared>, Path(account): Path<String>| async move {
                    let s = s.lock().unwrap();
                    s.wallets
                        .iter()
                        .find(|(_, (owner, _))| *owner == account)
                        .map(|(id, (owner, balance))| {
                            Json(serde_json::json!({
                                "wallet_id": id,
                                "account_id": owner,
                                "balance_cents": balance,
                            }))
                        })
                        .ok_or(StatusCode::NOT_FOUND)
                },
            ),
        )
        .route(
            "/wallets/{id}/debit",
            post(
                |State(s): State<Shared>,
                 Path(id): Path<String>,
                 Json(body): Json<serde_json::Value>| async move {
                    let amount = body["amount_cents"].as_i64().unwrap_or_default();
                    let mut s = s.lock().unwrap();
                    let (_, balance) = s.wallets.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
                    *balance -= amount;
                    Ok::<_, StatusCode>(Json(serde_json::json!({ "balance_cents": *balance })))
                },
            ),
        )
        .route(
            "/wallets/{id}/credit",
            post(
                |State(s): State<Shared>,
                 Path(id): Path<String>,
                 Json(body): Json<serde_json::Value>| async move {
                    let amount = body["amount_cents"].as_i64().unwrap_or_default();
                    let mut s = s.lock().unwrap();
                    let (_, balance) = s.wallets.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
                    *balance += amount;
                    Ok::<_, StatusCode>(Json(serde_json::json!({ "balance_cents": *balance })))
                },
            ),
        )
        .route(
            "/orders",
            post(
                |State(s): State<Shared>, Json(body): Json<serde_json::Value>| async move {
                    let mut s = s.lock().unwrap();
                    if s.fail_orders {
                        return Err(StatusCode::SERVICE_UNAVAILABLE);
                    }
                    let record = serde_json::json!({
                        "order_id": format!("ORD-{}", s.orders.len() + 1),
                        "account_id": body["account_id"],
                        "product_ids": body["product_ids"],
                        "created_at": chrono::Utc::now(),
                    });
                    s.orders.push(record.clone());
                    Ok((StatusCode::CREATED, Json(record)))
                },
            ),
        )
        .with_state(state)
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn http_coordinator(
    state: Shared,
) -> SagaCoordinator<HttpProductCatalog, HttpWalletService, HttpOrderService> {
    let base = serve(fake_router(state)).await;
    SagaCoordinator::new(
        HttpProductCatalog::new(&base).unwrap(),
        HttpWalletService::new(&base).unwrap(),
        HttpOrderService::new(&base).unwrap(),
        SagaConfig::default(),
    )
}

#[tokio::test]
async fn test_http_services_complete_order() {
    let account = AccountId::new();
    let p1 = ProductId::new();
    let p2 = ProductId::new();
    let state: Shared = Arc::default();
    {
        let mut s = state.lock().unwrap();
        s.prices.insert(p1.to_string(), 4_000);
        s.prices.insert(p2.to_string(), 3_000);
        s.wallets
            .insert("W1".to_string(), (account.to_string(), 10_000));
    }
    let coordinator = http_coordinator(Arc::clone(&state)).await;

    let outcome = coordinator
        .create_order(&ctx(), OrderRequest::new(account, vec![p1, p2]))
        .await
        .unwrap();

    let SagaOutcome::Completed {
        order, new_balance, ..
    } = outcome
    else {
        panic!("expected completed, got {outcome:?}");
    };
    assert_eq!(new_balance, Money::from_cents(3_000));
    assert_eq!(order.product_ids, vec![p1, p2]);
    assert_eq!(state.lock().unwrap().wallets["W1"].1, 3_000);
}

#[tokio::test]
async fn test_http_order_failure_is_credited_back() {
    let account = AccountId::new();
    let p1 = ProductId::new();
    let state: Shared = Arc::default();
    {
        let mut s = state.lock().unwrap();
        s.prices.insert(p1.to_string(), 7_000);
        s.wallets
            .insert("W1".to_string(), (account.to_string(), 10_000));
        s.fail_orders = true;
    }
    let coordinator = http_coordinator(Arc::clone(&state)).await;

    let outcome = coordinator
        .create_order(&ctx(), OrderRequest::new(account, vec![p1]))
        .await
        .unwrap();

    assert_eq!(outcome.compensation(), Some(CompensationStatus::Reconciled));
    assert_eq!(state.lock().unwrap().wallets["W1"].1, 10_000);
    assert!(state.lock().unwrap().orders.is_empty());
}

#[tokio::test]
async fn test_http_unknown_product_is_rejected() {
    let account = AccountId::new();
    let missing = ProductId::new();
    let state: Shared = Arc::default();
    state
        .lock()
        .unwrap()
        .wallets
        .insert("W1".to_string(), (account.to_string(), 10_000));
    let coordinator = http_coordinator(Arc::clone(&state)).await;

    let outcome = coordinator
        .create_order(&ctx(), OrderRequest::new(account, vec![missing]))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SagaOutcome::Rejected {
            reason: SagaError::ProductNotFound(missing)
        }
    );
    assert_eq!(state.lock().unwrap().wallets["W1"].1, 10_000);
}
