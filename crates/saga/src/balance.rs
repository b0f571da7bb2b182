//! Thin accessor over the remote wallet service.

use common::{AccountId, Money, WalletId};

use crate::context::RequestContext;
use crate::error::{Result, SagaError};
use crate::model::WalletHandle;
use crate::services::WalletService;

/// Lookup, debit and credit against the remote wallet.
///
/// Holds no local state. Credit is only used for compensation and its
/// errors are always returned to the caller.
#[derive(Debug, Clone)]
pub struct BalanceGateway<W> {
    wallets: W,
}

impl<W: WalletService> BalanceGateway<W> {
    pub fn new(wallets: W) -> Self {
        Self { wallets }
    }

    /// Reads the account's wallet. Fails with `WalletNotFound`.
    pub async fn get_wallet(
        &self,
        ctx: &RequestContext,
        account_id: AccountId,
    ) -> Result<WalletHandle> {
        ctx.run(
            "wallet",
            self.wallets.get_wallet_by_account(ctx, account_id),
        )
        .await
    }

    /// Debits `amount` and returns the new balance.
    ///
    /// Cancellation is honoured only before the debit is sent. After that
    /// the call is bounded by the deadline alone, and running out of time
    /// yields `DebitOutcomeUnknown` since the wallet may have applied it.
    #[tracing::instrument(skip(self, ctx), fields(%wallet_id, %amount))]
    pub async fn debit(
        &self,
        ctx: &RequestContext,
        wallet_id: &WalletId,
        amount: Money,
    ) -> Result<Money> {
        if ctx.is_cancelled() {
            return Err(SagaError::Cancelled);
        }
        if ctx.remaining().is_zero() {
            return Err(SagaError::unavailable("wallet", "deadline exceeded"));
        }
        let call = self.wallets.debit(ctx, wallet_id, amount);
        let balance = match tokio::time::timeout_at(ctx.deadline(), call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SagaError::DebitOutcomeUnknown {
                    reason: "deadline exceeded after the debit was sent".to_string(),
                });
            }
        };
        tracing::info!(%balance, "wallet debited");
        Ok(balance)
    }

    /// Credits `amount` back and returns the new balance.
    #[tracing::instrument(skip(self, ctx), fields(%wallet_id, %amount))]
    pub async fn credit(
        &self,
        ctx: &RequestContext,
        wallet_id: &WalletId,
        amount: Money,
    ) -> Result<Money> {
        let balance = ctx
            .run("wallet", self.wallets.credit(ctx, wallet_id, amount))
            .await?;
        tracing::info!(%balance, "wallet credited");
        Ok(balance)
    }
}
