//! In-memory store backend
//!
//! Mutex-guarded maps implementing the full storage contract. Every trait
//! method takes the lock once and applies all of its legs inside it, which
//! makes the atomicity guarantees trivial here - the Postgres backend earns
//! them with conditional UPDATEs and database transactions instead.
//!
//! This backend is NOT durable. It backs tests and local development; the
//! ledger must never depend on process-local memory in production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    GiftStore, LedgerStore, SessionClose, SessionStore, TransferSpec, WithdrawalPatch,
    WithdrawalStore,
};
use crate::balance::Wallet;
use crate::core_types::{AccountId, Coins};
use crate::error::BillingError;
use crate::gift::{Gift, GiftId};
use crate::ledger::{
    Account, PayoutDetails, Presence, Transaction, TransactionId, TransactionKind,
    TransactionStatus,
};
use crate::session::{Session, SessionId, SessionState};
use crate::withdrawal::{Withdrawal, WithdrawalId, WithdrawalState};

#[derive(Default)]
struct MemoryInner {
    accounts: HashMap<AccountId, Account>,
    wallets: HashMap<AccountId, Wallet>,
    /// Append-only; insertion order doubles as creation order
    transactions: Vec<Transaction>,
    /// Enforces the UNIQUE reference constraint
    by_reference: HashMap<String, usize>,
    sessions: HashMap<SessionId, Session>,
    withdrawals: HashMap<WithdrawalId, Withdrawal>,
    gifts: HashMap<GiftId, Gift>,
}

impl MemoryInner {
    fn wallet_mut(&mut self, id: AccountId) -> Result<&mut Wallet, BillingError> {
        self.wallets
            .get_mut(&id)
            .ok_or(BillingError::AccountNotFound(id))
    }

    /// Append a transaction, enforcing reference uniqueness
    fn append_transaction(&mut self, tx: Transaction) -> Result<usize, BillingError> {
        if self.by_reference.contains_key(&tx.reference) {
            return Err(BillingError::DuplicateReference(tx.reference));
        }
        let idx = self.transactions.len();
        self.by_reference.insert(tx.reference.clone(), idx);
        self.transactions.push(tx);
        Ok(idx)
    }

    fn credit_wallet(&mut self, id: AccountId, amount: Coins) -> Result<Coins, BillingError> {
        let wallet = self.wallet_mut(id)?;
        wallet
            .credit(amount)
            .map_err(|e| BillingError::Store(e.to_string()))?;
        Ok(wallet.balance())
    }

    fn debit_wallet(&mut self, id: AccountId, amount: Coins) -> Result<Coins, BillingError> {
        let wallet = self.wallet_mut(id)?;
        wallet
            .debit(amount)
            .map_err(|_| BillingError::InsufficientBalance)?;
        Ok(wallet.balance())
    }
}

/// Non-durable store for tests and local development
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // A poisoned lock means a panic mid-mutation; the maps may be torn
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Create an account with an opening balance, skipping the transaction
    /// log (test/seed use only)
    pub fn seed_account(&self, account: Account, opening_balance: Coins) {
        let mut inner = self.lock();
        inner
            .wallets
            .insert(account.account_id, Wallet::with_balance(opening_balance));
        inner.accounts.insert(account.account_id, account);
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_account(&self, account: Account) -> Result<(), BillingError> {
        let mut inner = self.lock();
        if inner.accounts.contains_key(&account.account_id) {
            return Err(BillingError::Store(format!(
                "account {} already exists",
                account.account_id
            )));
        }
        inner.wallets.insert(account.account_id, Wallet::default());
        inner.accounts.insert(account.account_id, account);
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, BillingError> {
        Ok(self.lock().accounts.get(&id).cloned())
    }

    async fn update_presence(
        &self,
        id: AccountId,
        presence: Presence,
    ) -> Result<(), BillingError> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or(BillingError::AccountNotFound(id))?;
        account.presence = presence;
        Ok(())
    }

    async fn update_payout_details(
        &self,
        id: AccountId,
        payout: PayoutDetails,
    ) -> Result<(), BillingError> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or(BillingError::AccountNotFound(id))?;
        account.payout = Some(payout);
        Ok(())
    }

    async fn bump_payee_stats(
        &self,
        id: AccountId,
        earned: Coins,
        billed_seconds: u64,
    ) -> Result<(), BillingError> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or(BillingError::AccountNotFound(id))?;
        account.stats.total_earned = account.stats.total_earned.saturating_add(earned);
        account.stats.total_billed_seconds = account
            .stats
            .total_billed_seconds
            .saturating_add(billed_seconds);
        if billed_seconds > 0 {
            account.stats.sessions_settled += 1;
        }
        Ok(())
    }

    async fn balance_of(&self, id: AccountId) -> Result<Coins, BillingError> {
        self.lock()
            .wallets
            .get(&id)
            .map(|w| w.balance())
            .ok_or(BillingError::AccountNotFound(id))
    }

    async fn credit(&self, id: AccountId, amount: Coins) -> Result<Coins, BillingError> {
        self.lock().credit_wallet(id, amount)
    }

    async fn try_debit(&self, id: AccountId, amount: Coins) -> Result<Coins, BillingError> {
        self.lock().debit_wallet(id, amount)
    }

    async fn credit_with_transaction(
        &self,
        id: AccountId,
        amount: Coins,
        tx: Transaction,
    ) -> Result<Coins, BillingError> {
        let mut inner = self.lock();
        inner.wallet_mut(id)?;
        let idx = inner.append_transaction(tx)?;
        match inner.credit_wallet(id, amount) {
            Ok(balance) => Ok(balance),
            Err(e) => {
                // Unwind the append so no leg applies alone
                let tx = inner.transactions.remove(idx);
                inner.by_reference.remove(&tx.reference);
                Err(e)
            }
        }
    }

    async fn debit_with_transaction(
        &self,
        id: AccountId,
        amount: Coins,
        tx: Transaction,
    ) -> Result<Coins, BillingError> {
        let mut inner = self.lock();
        // Debit can fail; append only after it holds
        let balance = inner.debit_wallet(id, amount)?;
        match inner.append_transaction(tx) {
            Ok(_) => Ok(balance),
            Err(e) => {
                // Roll the debit back so no leg applies alone
                inner.credit_wallet(id, amount)?;
                Err(e)
            }
        }
    }

    async fn transfer(&self, spec: TransferSpec) -> Result<Transaction, BillingError> {
        let mut inner = self.lock();

        if inner.by_reference.contains_key(&spec.reference) {
            return Err(BillingError::DuplicateReference(spec.reference));
        }
        // Both wallets must exist before any leg applies
        inner.wallet_mut(spec.payer)?;
        inner.wallet_mut(spec.payee)?;

        inner.debit_wallet(spec.payer, spec.gross)?;
        inner.credit_wallet(spec.payee, spec.gross - spec.commission)?;

        let tx = Transaction::completed(
            spec.kind,
            spec.payer,
            spec.payee,
            spec.gross,
            spec.commission,
            spec.reference,
            spec.metadata,
        );
        inner.append_transaction(tx.clone())?;
        Ok(tx)
    }

    async fn insert_transaction(&self, tx: Transaction) -> Result<(), BillingError> {
        self.lock().append_transaction(tx).map(|_| ())
    }

    async fn transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, BillingError> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .find(|t| t.transaction_id == id)
            .cloned())
    }

    async fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, BillingError> {
        let inner = self.lock();
        Ok(inner
            .by_reference
            .get(reference)
            .map(|&idx| inner.transactions[idx].clone()))
    }

    async fn complete_recharge(
        &self,
        order_reference: &str,
        payment_id: &str,
    ) -> Result<(Transaction, Coins), BillingError> {
        let mut inner = self.lock();
        let idx = *inner
            .by_reference
            .get(order_reference)
            .ok_or_else(|| BillingError::TransactionNotFound(order_reference.to_string()))?;

        let tx = &inner.transactions[idx];
        if tx.kind != TransactionKind::Recharge
            || !tx.status.can_transition_to(TransactionStatus::Completed)
        {
            return Err(BillingError::AlreadyProcessed);
        }
        let (account, amount) = (tx.payer, tx.net);

        let balance = inner.credit_wallet(account, amount)?;
        let tx = &mut inner.transactions[idx];
        tx.status = TransactionStatus::Completed;
        tx.metadata.payment_id = Some(payment_id.to_string());
        Ok((tx.clone(), balance))
    }

    async fn fail_recharge(&self, order_reference: &str) -> Result<Transaction, BillingError> {
        let mut inner = self.lock();
        let idx = *inner
            .by_reference
            .get(order_reference)
            .ok_or_else(|| BillingError::TransactionNotFound(order_reference.to_string()))?;

        let tx = &mut inner.transactions[idx];
        if !tx.status.can_transition_to(TransactionStatus::Failed) {
            return Err(BillingError::AlreadyProcessed);
        }
        tx.status = TransactionStatus::Failed;
        Ok(tx.clone())
    }

    async fn list_transactions(
        &self,
        account: AccountId,
        kind: Option<TransactionKind>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Transaction>, BillingError> {
        let inner = self.lock();
        Ok(inner
            .transactions
            .iter()
            .rev() // append-only: newest last
            .filter(|t| t.payer == account || t.payee == Some(account))
            .filter(|t| kind.is_none_or(|k| t.kind == k))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find_or_create_session(&self, session: Session) -> Result<Session, BillingError> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .sessions
            .values()
            .find(|s| {
                s.payer == session.payer
                    && s.payee == session.payee
                    && s.state == SessionState::Active
            })
            .cloned()
        {
            return Ok(existing);
        }
        inner.sessions.insert(session.session_id, session.clone());
        Ok(session)
    }

    async fn session(&self, id: SessionId) -> Result<Option<Session>, BillingError> {
        Ok(self.lock().sessions.get(&id).cloned())
    }

    async fn mark_settling(
        &self,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<bool, BillingError> {
        let mut inner = self.lock();
        let Some(session) = inner.sessions.get_mut(&id) else {
            return Ok(false);
        };
        if session.state != SessionState::Active {
            return Ok(false);
        }
        session.state = SessionState::Settling;
        session.ended_at = Some(now);
        session.updated_at = now;
        Ok(true)
    }

    async fn update_session_state_if(
        &self,
        id: SessionId,
        expected: SessionState,
        new: SessionState,
        now: DateTime<Utc>,
    ) -> Result<bool, BillingError> {
        let mut inner = self.lock();
        let Some(session) = inner.sessions.get_mut(&id) else {
            return Ok(false);
        };
        if session.state != expected {
            return Ok(false);
        }
        session.state = new;
        session.updated_at = now;
        Ok(true)
    }

    async fn finalize_session(
        &self,
        id: SessionId,
        close: SessionClose,
    ) -> Result<bool, BillingError> {
        let mut inner = self.lock();
        let Some(session) = inner.sessions.get_mut(&id) else {
            return Ok(false);
        };
        if session.state != SessionState::Settling {
            return Ok(false);
        }
        session.state = SessionState::Ended;
        session.billed_units = close.billed_units;
        session.shortfall_units = close.shortfall_units;
        session.settlement_tx = close.settlement_tx;
        session.updated_at = close.now;
        Ok(true)
    }

    async fn find_stale_settling(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Session>, BillingError> {
        let inner = self.lock();
        let mut stale: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| s.state == SessionState::Settling && s.updated_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|s| s.updated_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }
}

#[async_trait]
impl WithdrawalStore for MemoryStore {
    async fn reserve_withdrawal(
        &self,
        withdrawal: Withdrawal,
        reserve_tx: Transaction,
    ) -> Result<(), BillingError> {
        let mut inner = self.lock();

        if inner.by_reference.contains_key(&reserve_tx.reference) {
            return Err(BillingError::DuplicateReference(reserve_tx.reference));
        }
        inner.debit_wallet(withdrawal.payee, withdrawal.amount)?;
        inner.append_transaction(reserve_tx)?;
        inner
            .withdrawals
            .insert(withdrawal.withdrawal_id, withdrawal);
        Ok(())
    }

    async fn withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, BillingError> {
        Ok(self.lock().withdrawals.get(&id).cloned())
    }

    async fn update_withdrawal_state_if(
        &self,
        id: WithdrawalId,
        expected: WithdrawalState,
        new: WithdrawalState,
        patch: WithdrawalPatch,
    ) -> Result<bool, BillingError> {
        let mut inner = self.lock();
        let Some(withdrawal) = inner.withdrawals.get_mut(&id) else {
            return Ok(false);
        };
        if withdrawal.state != expected {
            return Ok(false);
        }
        withdrawal.state = new;
        apply_patch(withdrawal, patch);
        Ok(true)
    }

    async fn refund_withdrawal(
        &self,
        id: WithdrawalId,
        expected: WithdrawalState,
        new: WithdrawalState,
        patch: WithdrawalPatch,
        refund_tx: Transaction,
    ) -> Result<bool, BillingError> {
        let mut inner = self.lock();
        let Some(withdrawal) = inner.withdrawals.get(&id) else {
            return Ok(false);
        };
        if withdrawal.state != expected {
            return Ok(false);
        }
        let (payee, amount) = (withdrawal.payee, withdrawal.amount);

        let refund_id = refund_tx.transaction_id;
        inner.append_transaction(refund_tx)?;
        inner.credit_wallet(payee, amount)?;

        let withdrawal = inner
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| BillingError::WithdrawalNotFound(id.to_string()))?;
        withdrawal.state = new;
        withdrawal.refund_tx = Some(refund_id);
        apply_patch(withdrawal, patch);
        Ok(true)
    }

    async fn list_withdrawals(
        &self,
        payee: AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Withdrawal>, BillingError> {
        let inner = self.lock();
        let mut rows: Vec<Withdrawal> = inner
            .withdrawals
            .values()
            .filter(|w| w.payee == payee)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

fn apply_patch(withdrawal: &mut Withdrawal, patch: WithdrawalPatch) {
    if let Some(by) = patch.processed_by {
        withdrawal.processed_by = Some(by);
    }
    if let Some(reason) = patch.reason {
        withdrawal.reason = Some(reason);
    }
    if let Some(payout_ref) = patch.payout_reference {
        withdrawal.payout_reference = Some(payout_ref);
    }
    if let Some(refund_tx) = patch.refund_tx {
        withdrawal.refund_tx = Some(refund_tx);
    }
    if let Some(at) = patch.processed_at {
        withdrawal.processed_at = Some(at);
        withdrawal.updated_at = at;
    }
}

#[async_trait]
impl GiftStore for MemoryStore {
    async fn upsert_gift(&self, gift: Gift) -> Result<(), BillingError> {
        self.lock().gifts.insert(gift.gift_id, gift);
        Ok(())
    }

    async fn gift(&self, id: GiftId) -> Result<Option<Gift>, BillingError> {
        Ok(self.lock().gifts.get(&id).cloned())
    }

    async fn list_active_gifts(&self) -> Result<Vec<Gift>, BillingError> {
        let inner = self.lock();
        let mut gifts: Vec<Gift> = inner.gifts.values().filter(|g| g.is_active).cloned().collect();
        gifts.sort_by_key(|g| g.price_coins);
        Ok(gifts)
    }

    async fn bump_gift_counters(
        &self,
        id: GiftId,
        quantity: u32,
        gross: Coins,
    ) -> Result<(), BillingError> {
        let mut inner = self.lock();
        let gift = inner
            .gifts
            .get_mut(&id)
            .ok_or_else(|| BillingError::GiftNotFound(id.to_string()))?;
        gift.purchase_count += quantity as u64;
        gift.total_coins = gift.total_coins.saturating_add(gross);
        Ok(())
    }
}
