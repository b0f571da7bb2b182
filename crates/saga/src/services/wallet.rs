//! Wallet service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{AccountId, Money, WalletId};
use tokio::sync::RwLock;

use crate::context::RequestContext;
use crate::error::SagaError;
use crate::model::WalletHandle;

/// Access to the remote wallet (balance) service.
///
/// Each operation is one remote call; atomicity of a single debit or
/// credit is the remote service's job.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Returns a snapshot of the account's wallet.
    async fn get_wallet_by_account(
        &self,
        ctx: &RequestContext,
        account_id: AccountId,
    ) -> Result<WalletHandle, SagaError>;

    /// Removes `amount` from the wallet and returns the new balance.
    async fn debit(
        &self,
        ctx: &RequestContext,
        wallet_id: &WalletId,
        amount: Money,
    ) -> Result<Money, SagaError>;

    /// Adds `amount` to the wallet and returns the new balance.
    async fn credit(
        &self,
        ctx: &RequestContext,
        wallet_id: &WalletId,
        amount: Money,
    ) -> Result<Money, SagaError>;
}

#[derive(Debug)]
struct StoredWallet {
    account_id: AccountId,
    balance: Money,
}

#[derive(Debug, Default)]
struct InMemoryWalletState {
    wallets: HashMap<WalletId, StoredWallet>,
    by_account: HashMap<AccountId, WalletId>,
    next_id: u32,
    debits: Vec<(WalletId, Money)>,
    credits: Vec<(WalletId, Money)>,
    debit_attempts: usize,
    credit_attempts: usize,
    fail_on_debit: bool,
    fail_on_credit: bool,
    allow_overdraft: bool,
    latency: Option<Duration>,
}

/// In-memory wallet service for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWalletService {
    state: Arc<RwLock<InMemoryWalletState>>,
}

impl InMemoryWalletService {
    /// Creates a wallet service with no wallets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a wallet for `account_id` with an initial balance.
    pub async fn open_wallet(&self, account_id: AccountId, balance: Money) -> WalletId {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let wallet_id = WalletId::new(format!("WAL-{:04}", state.next_id));
        state.wallets.insert(
            wallet_id.clone(),
            StoredWallet {
                account_id,
                balance,
            },
        );
        state.by_account.insert(account_id, wallet_id.clone());
        wallet_id
    }

    /// Returns the current balance of the account's wallet.
    pub async fn balance_of(&self, account_id: AccountId) -> Option<Money> {
        let state = self.state.read().await;
        let wallet_id = state.by_account.get(&account_id)?;
        state.wallets.get(wallet_id).map(|w| w.balance)
    }

    /// Configures every debit to fail with a transport error.
    pub async fn set_fail_on_debit(&self, fail: bool) {
        self.state.write().await.fail_on_debit = fail;
    }

    /// Configures every credit to fail with a transport error.
    pub async fn set_fail_on_credit(&self, fail: bool) {
        self.state.write().await.fail_on_credit = fail;
    }

    /// Lets debits drive balances negative, so only the caller's own
    /// balance check protects the wallet.
    pub async fn set_allow_overdraft(&self, allow: bool) {
        self.state.write().await.allow_overdraft = allow;
    }

    /// Adds an artificial delay before every call is served.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().await.latency = latency;
    }

    /// Returns the successful debits, in the order they were applied.
    pub async fn debits(&self) -> Vec<(WalletId, Money)> {
        self.state.read().await.debits.clone()
    }

    /// Returns the successful credits, in the order they were applied.
    pub async fn credits(&self) -> Vec<(WalletId, Money)> {
        self.state.read().await.credits.clone()
    }

    /// Returns how many debit calls were received, including failed ones.
    pub async fn debit_attempts(&self) -> usize {
        self.state.read().await.debit_attempts
    }

    /// Returns how many credit calls were received, including failed ones.
    pub async fn credit_attempts(&self) -> usize {
        self.state.read().await.credit_attempts
    }

    async fn simulate_latency(&self) {
        let latency = self.state.read().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl WalletService for InMemoryWalletService {
    async fn get_wallet_by_account(
        &self,
        _ctx: &RequestContext,
        account_id: AccountId,
    ) -> Result<WalletHandle, SagaError> {
        self.simulate_latency().await;
        let state = self.state.read().await;
        let wallet_id = state
            .by_account
            .get(&account_id)
            .ok_or(SagaError::WalletNotFound(account_id))?;
        let wallet = state
            .wallets
            .get(wallet_id)
            .ok_or(SagaError::WalletNotFound(account_id))?;

        Ok(WalletHandle {
            wallet_id: wallet_id.clone(),
            account_id: wallet.account_id,
            balance: wallet.balance,
        })
    }

    async fn debit(
        &self,
        _ctx: &RequestContext,
        wallet_id: &WalletId,
        amount: Money,
    ) -> Result<Money, SagaError> {
        self.simulate_latency().await;
        let mut state = self.state.write().await;
        state.debit_attempts += 1;

        if state.fail_on_debit {
            return Err(SagaError::unavailable("wallet", "connection reset"));
        }
        if amount.is_negative() {
            return Err(SagaError::DebitDeclined("invalid amount".to_string()));
        }

        let allow_overdraft = state.allow_overdraft;
        let wallet = state
            .wallets
            .get_mut(wallet_id)
            .ok_or_else(|| SagaError::DebitDeclined(format!("wallet {wallet_id} not found")))?;

        if !allow_overdraft && wallet.balance < amount {
            return Err(SagaError::InsufficientFunds {
                required: amount,
                available: wallet.balance,
            });
        }
        wallet.balance = wallet
            .balance
            .checked_sub(amount)
            .ok_or(SagaError::AmountOverflow)?;
        let balance = wallet.balance;
        state.debits.push((wallet_id.clone(), amount));

        Ok(balance)
    }

    async fn credit(
        &self,
        _ctx: &RequestContext,
        wallet_id: &WalletId,
        amount: Money,
    ) -> Result<Money, SagaError> {
        self.simulate_latency().await;
        let mut state = self.state.write().await;
        state.credit_attempts += 1;

        if state.fail_on_credit {
            return Err(SagaError::unavailable("wallet", "connection reset"));
        }

        let wallet = state.wallets.get_mut(wallet_id).ok_or_else(|| {
            SagaError::unavailable("wallet", format!("wallet {wallet_id} not found"))
        })?;
        wallet.balance = wallet
            .balance
            .checked_add(amount)
            .ok_or(SagaError::AmountOverflow)?;
        let balance = wallet.balance;
        state.credits.push((wallet_id.clone(), amount));

        Ok(balance)
    }
}
