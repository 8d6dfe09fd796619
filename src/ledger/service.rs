//! Ledger service
//!
//! Validation gateway over the ledger store. Controllers and the other
//! billing services go through here; nothing else mutates balances.

use std::sync::Arc;
use tracing::info;

use crate::core_types::{AccountId, Coins};
use crate::error::BillingError;
use crate::notify::{dispatch, BillingEvent, Notifier};
use crate::store::{LedgerStore, TransferSpec};

use super::transaction::{
    Transaction, TransactionKind, TransactionMetadata, TransactionStatus,
};

/// Minimum coins per recharge order when no config overrides it
pub const DEFAULT_MIN_RECHARGE: Coins = 100;

/// Maximum page size for history queries
const MAX_PAGE: u32 = 100;

/// Direction of a manual balance correction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustDirection {
    Credit,
    Debit,
}

/// Validated entry point for every balance mutation
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    min_recharge: Coins,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            min_recharge: DEFAULT_MIN_RECHARGE,
        }
    }

    pub fn with_min_recharge(mut self, min_recharge: Coins) -> Self {
        self.min_recharge = min_recharge;
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub async fn balance_of(&self, account: AccountId) -> Result<Coins, BillingError> {
        self.store.balance_of(account).await
    }

    /// Increase a balance
    ///
    /// Low-level primitive; flows that need an audit trail use the recharge
    /// pair or `manual_adjust` instead.
    pub async fn credit(&self, account: AccountId, amount: Coins) -> Result<Coins, BillingError> {
        if amount == 0 {
            return Err(BillingError::InvalidAmount);
        }
        self.store.credit(account, amount).await
    }

    /// Decrease a balance, refusing to overdraw
    pub async fn debit(&self, account: AccountId, amount: Coins) -> Result<Coins, BillingError> {
        if amount == 0 {
            return Err(BillingError::InvalidAmount);
        }
        self.store.try_debit(account, amount).await
    }

    /// Atomic payer-to-payee movement with a commission split
    ///
    /// Either the payer debit, payee credit and transaction record all land,
    /// or none do.
    pub async fn transfer(&self, spec: TransferSpec) -> Result<Transaction, BillingError> {
        if spec.gross == 0 {
            return Err(BillingError::InvalidAmount);
        }
        if spec.payer == spec.payee {
            return Err(BillingError::SameAccount);
        }
        debug_assert!(spec.commission <= spec.gross);

        let tx = self.store.transfer(spec).await?;
        info!(
            transaction_id = %tx.transaction_id,
            kind = %tx.kind,
            payer = tx.payer,
            payee = ?tx.payee,
            gross = tx.gross,
            commission = tx.commission,
            net = tx.net,
            "transfer settled"
        );
        Ok(tx)
    }

    /// Record a recharge order before the gateway collects payment
    ///
    /// The pending transaction pins the order reference; nothing is credited
    /// until the gateway's verified callback completes it.
    pub async fn begin_recharge(
        &self,
        account: AccountId,
        amount: Coins,
        order_reference: impl Into<String>,
    ) -> Result<Transaction, BillingError> {
        if amount < self.min_recharge {
            return Err(BillingError::InvalidAmount);
        }
        let account_record = self
            .store
            .get_account(account)
            .await?
            .ok_or(BillingError::AccountNotFound(account))?;
        if !account_record.is_active() {
            return Err(BillingError::AccountDeactivated);
        }

        let order_reference = order_reference.into();
        let tx = Transaction::single_party(
            TransactionKind::Recharge,
            TransactionStatus::Pending,
            account,
            amount,
            order_reference.clone(),
            TransactionMetadata::for_order(order_reference),
        );
        self.store.insert_transaction(tx.clone()).await?;
        Ok(tx)
    }

    /// Credit a recharge after the gateway verified the payment
    ///
    /// Idempotent: a second callback for the same order is rejected with
    /// `AlreadyProcessed` and credits nothing.
    pub async fn complete_recharge(
        &self,
        order_reference: &str,
        payment_id: &str,
    ) -> Result<(Transaction, Coins), BillingError> {
        let (tx, balance) = self
            .store
            .complete_recharge(order_reference, payment_id)
            .await?;

        info!(
            account = tx.payer,
            amount = tx.net,
            balance,
            order_reference,
            "recharge completed"
        );
        dispatch(
            &self.notifier,
            BillingEvent::RechargeCompleted {
                account: tx.payer,
                amount: tx.net,
                balance,
            },
        );
        Ok((tx, balance))
    }

    /// Mark a recharge order failed (gateway rejected or expired it)
    pub async fn fail_recharge(
        &self,
        order_reference: &str,
    ) -> Result<Transaction, BillingError> {
        self.store.fail_recharge(order_reference).await
    }

    /// Admin-initiated signed balance correction
    pub async fn manual_adjust(
        &self,
        account: AccountId,
        direction: AdjustDirection,
        amount: Coins,
        note: impl Into<String>,
        reference: impl Into<String>,
    ) -> Result<Transaction, BillingError> {
        if amount == 0 {
            return Err(BillingError::InvalidAmount);
        }

        let tx = Transaction::single_party(
            TransactionKind::ManualAdjustment,
            TransactionStatus::Completed,
            account,
            amount,
            reference,
            TransactionMetadata {
                note: Some(note.into()),
                ..Default::default()
            },
        );

        let balance = match direction {
            AdjustDirection::Credit => {
                self.store
                    .credit_with_transaction(account, amount, tx.clone())
                    .await?
            }
            AdjustDirection::Debit => {
                self.store
                    .debit_with_transaction(account, amount, tx.clone())
                    .await?
            }
        };

        info!(
            account,
            ?direction,
            amount,
            balance,
            transaction_id = %tx.transaction_id,
            "manual adjustment applied"
        );
        Ok(tx)
    }

    /// Newest-first transaction history
    pub async fn history(
        &self,
        account: AccountId,
        kind: Option<TransactionKind>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Transaction>, BillingError> {
        self.store
            .list_transactions(account, kind, limit.clamp(1, MAX_PAGE), offset)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Account, RateCard};
    use crate::notify::LogNotifier;
    use crate::store::MemoryStore;

    fn ledger_with_store() -> (Ledger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(Account::new_user(1, "payer"), 1000);
        store.seed_account(Account::new_payee(2, "payee", RateCard::flat(10)), 0);
        let ledger = Ledger::new(store.clone(), Arc::new(LogNotifier));
        (ledger, store)
    }

    #[tokio::test]
    async fn test_zero_amounts_rejected() {
        let (ledger, _) = ledger_with_store();

        assert!(matches!(
            ledger.credit(1, 0).await,
            Err(BillingError::InvalidAmount)
        ));
        assert!(matches!(
            ledger.debit(1, 0).await,
            Err(BillingError::InvalidAmount)
        ));
    }

    #[tokio::test]
    async fn test_transfer_rejects_same_account() {
        let (ledger, _) = ledger_with_store();

        let err = ledger
            .transfer(TransferSpec {
                kind: TransactionKind::GiftPayment,
                payer: 1,
                payee: 1,
                gross: 10,
                commission: 2,
                reference: "r1".into(),
                metadata: TransactionMetadata::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::SameAccount));
    }

    #[tokio::test]
    async fn test_recharge_two_phase() {
        let (ledger, _) = ledger_with_store();

        ledger.begin_recharge(1, 500, "order_77").await.unwrap();
        // Nothing credited while pending
        assert_eq!(ledger.balance_of(1).await.unwrap(), 1000);

        let (tx, balance) = ledger.complete_recharge("order_77", "pay_77").await.unwrap();
        assert_eq!(balance, 1500);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.metadata.payment_id.as_deref(), Some("pay_77"));

        // Replayed gateway callback must not double-credit
        assert!(matches!(
            ledger.complete_recharge("order_77", "pay_77").await,
            Err(BillingError::AlreadyProcessed)
        ));
        assert_eq!(ledger.balance_of(1).await.unwrap(), 1500);
    }

    #[tokio::test]
    async fn test_recharge_below_minimum() {
        let (ledger, _) = ledger_with_store();
        assert!(matches!(
            ledger.begin_recharge(1, 99, "order_x").await,
            Err(BillingError::InvalidAmount)
        ));

        // A configured floor overrides the default
        let strict = ledger.clone().with_min_recharge(500);
        assert!(matches!(
            strict.begin_recharge(1, 499, "order_y").await,
            Err(BillingError::InvalidAmount)
        ));
        assert!(strict.begin_recharge(1, 500, "order_z").await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_recharge_credits_nothing() {
        let (ledger, _) = ledger_with_store();

        ledger.begin_recharge(1, 500, "order_f").await.unwrap();
        let failed = ledger.fail_recharge("order_f").await.unwrap();
        assert_eq!(failed.status, TransactionStatus::Failed);
        assert_eq!(ledger.balance_of(1).await.unwrap(), 1000);

        // A late gateway callback cannot revive a failed order
        assert!(matches!(
            ledger.complete_recharge("order_f", "pay_f").await,
            Err(BillingError::AlreadyProcessed)
        ));
    }

    #[tokio::test]
    async fn test_manual_adjust_both_directions() {
        let (ledger, _) = ledger_with_store();

        ledger
            .manual_adjust(1, AdjustDirection::Debit, 300, "chargeback", "adj_1")
            .await
            .unwrap();
        assert_eq!(ledger.balance_of(1).await.unwrap(), 700);

        ledger
            .manual_adjust(1, AdjustDirection::Credit, 50, "goodwill", "adj_2")
            .await
            .unwrap();
        assert_eq!(ledger.balance_of(1).await.unwrap(), 750);
    }

    #[tokio::test]
    async fn test_history_filters_by_kind() {
        let (ledger, _) = ledger_with_store();

        ledger.begin_recharge(1, 500, "order_h").await.unwrap();
        ledger.complete_recharge("order_h", "pay_h").await.unwrap();
        ledger
            .manual_adjust(1, AdjustDirection::Debit, 10, "fix", "adj_h")
            .await
            .unwrap();

        let all = ledger.history(1, None, 20, 0).await.unwrap();
        assert_eq!(all.len(), 2);

        let recharges = ledger
            .history(1, Some(TransactionKind::Recharge), 20, 0)
            .await
            .unwrap();
        assert_eq!(recharges.len(), 1);
        assert_eq!(recharges[0].kind, TransactionKind::Recharge);
    }
}
