//! Storage seam
//!
//! The billing core owns the rules; a store owns durability. Two backends
//! implement these traits: [`postgres::PgStore`] for production and
//! [`memory::MemoryStore`] for tests and local development.
//!
//! # Atomicity contract
//!
//! Balances are the only shared mutable resource in the core, and every
//! method that moves coins is a single atomically-applied unit:
//!
//! - conditional debits check-and-apply in one operation (no read-then-write
//!   window), failing with `InsufficientBalance` instead of overdrawing
//! - state transitions are CAS: `expected -> new`, reporting `false` when
//!   another caller already moved the record
//! - transaction `reference` is UNIQUE; a second insert with the same
//!   reference fails with `DuplicateReference` and applies no balance legs
//! - multi-leg methods (`transfer`, `reserve_withdrawal`,
//!   `refund_withdrawal`, `complete_recharge`) apply all legs or none

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core_types::{AccountId, Coins};
use crate::error::BillingError;
use crate::gift::{Gift, GiftId};
use crate::ledger::{
    Account, PayoutDetails, Presence, Transaction, TransactionId, TransactionKind,
    TransactionMetadata,
};
use crate::session::{Session, SessionId, SessionState};
use crate::withdrawal::{Withdrawal, WithdrawalId, WithdrawalState};

/// A two-party atomic balance movement
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub kind: TransactionKind,
    pub payer: AccountId,
    pub payee: AccountId,
    pub gross: Coins,
    pub commission: Coins,
    pub reference: String,
    pub metadata: TransactionMetadata,
}

/// Settlement results recorded when a session reaches ENDED
#[derive(Debug, Clone)]
pub struct SessionClose {
    pub billed_units: u64,
    pub shortfall_units: u64,
    pub settlement_tx: Option<TransactionId>,
    pub now: DateTime<Utc>,
}

/// Fields recorded when an admin processes a withdrawal
#[derive(Debug, Clone, Default)]
pub struct WithdrawalPatch {
    pub processed_by: Option<AccountId>,
    pub reason: Option<String>,
    pub payout_reference: Option<String>,
    pub refund_tx: Option<TransactionId>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Accounts, balances and the transaction log
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn create_account(&self, account: Account) -> Result<(), BillingError>;

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, BillingError>;

    async fn update_presence(&self, id: AccountId, presence: Presence)
        -> Result<(), BillingError>;

    async fn update_payout_details(
        &self,
        id: AccountId,
        payout: PayoutDetails,
    ) -> Result<(), BillingError>;

    /// Add to a payee's lifetime earning counters (best-effort, outside the
    /// settlement's atomic unit)
    async fn bump_payee_stats(
        &self,
        id: AccountId,
        earned: Coins,
        billed_seconds: u64,
    ) -> Result<(), BillingError>;

    async fn balance_of(&self, id: AccountId) -> Result<Coins, BillingError>;

    /// Unconditional atomic balance increment; returns the new balance
    async fn credit(&self, id: AccountId, amount: Coins) -> Result<Coins, BillingError>;

    /// Conditional atomic balance decrement; returns the new balance
    ///
    /// # Errors
    /// `InsufficientBalance` if the balance cannot cover `amount`; the
    /// balance is untouched.
    async fn try_debit(&self, id: AccountId, amount: Coins) -> Result<Coins, BillingError>;

    /// Atomic credit + transaction append (refunds, adjustments)
    async fn credit_with_transaction(
        &self,
        id: AccountId,
        amount: Coins,
        tx: Transaction,
    ) -> Result<Coins, BillingError>;

    /// Atomic conditional debit + transaction append (adjustments)
    async fn debit_with_transaction(
        &self,
        id: AccountId,
        amount: Coins,
        tx: Transaction,
    ) -> Result<Coins, BillingError>;

    /// Atomic two-party movement: debit payer `gross`, credit payee
    /// `gross - commission`, append one completed transaction
    ///
    /// # Errors
    /// - `InsufficientBalance`: payer can't cover `gross`; nothing applied
    /// - `DuplicateReference`: reference already recorded; nothing applied
    async fn transfer(&self, spec: TransferSpec) -> Result<Transaction, BillingError>;

    /// Append a transaction without moving any balance (pending recharges)
    async fn insert_transaction(&self, tx: Transaction) -> Result<(), BillingError>;

    async fn transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, BillingError>;

    async fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, BillingError>;

    /// Atomically flip a pending recharge to completed and credit the coins
    ///
    /// # Errors
    /// - `TransactionNotFound`: unknown order reference
    /// - `AlreadyProcessed`: the recharge is no longer pending
    async fn complete_recharge(
        &self,
        order_reference: &str,
        payment_id: &str,
    ) -> Result<(Transaction, Coins), BillingError>;

    /// Flip a pending recharge to failed (gateway rejected the payment)
    async fn fail_recharge(&self, order_reference: &str) -> Result<Transaction, BillingError>;

    /// Newest-first transaction history for an account (payer or payee side)
    async fn list_transactions(
        &self,
        account: AccountId,
        kind: Option<TransactionKind>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Transaction>, BillingError>;
}

/// Metered session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert an active session, or return the pair's existing active one
    ///
    /// At most one active session exists per (payer, payee) pair; racing
    /// starts converge on a single record.
    async fn find_or_create_session(&self, session: Session) -> Result<Session, BillingError>;

    async fn session(&self, id: SessionId) -> Result<Option<Session>, BillingError>;

    /// CAS ACTIVE -> SETTLING, freezing the billing clock at `now`
    ///
    /// Returns `false` if the session already left ACTIVE; `ended_at` is
    /// only ever written by the winning caller.
    async fn mark_settling(
        &self,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<bool, BillingError>;

    /// CAS to a terminal state with no settlement (cancel/fail paths)
    async fn update_session_state_if(
        &self,
        id: SessionId,
        expected: SessionState,
        new: SessionState,
        now: DateTime<Utc>,
    ) -> Result<bool, BillingError>;

    /// CAS SETTLING -> ENDED, recording the settlement results
    async fn finalize_session(
        &self,
        id: SessionId,
        close: SessionClose,
    ) -> Result<bool, BillingError>;

    /// Sessions stuck in SETTLING since before `cutoff` (recovery scans)
    async fn find_stale_settling(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Session>, BillingError>;
}

/// Withdrawal requests
#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Atomically: conditional debit of the reserve from the payee, append
    /// the reserve transaction, insert the withdrawal record
    ///
    /// # Errors
    /// - `InsufficientBalance`: payee can't cover the reserve; nothing applied
    /// - `DuplicateReference`: reserve already recorded; nothing applied
    async fn reserve_withdrawal(
        &self,
        withdrawal: Withdrawal,
        reserve_tx: Transaction,
    ) -> Result<(), BillingError>;

    async fn withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, BillingError>;

    /// CAS state transition recording the patch fields (approve/complete)
    async fn update_withdrawal_state_if(
        &self,
        id: WithdrawalId,
        expected: WithdrawalState,
        new: WithdrawalState,
        patch: WithdrawalPatch,
    ) -> Result<bool, BillingError>;

    /// Atomically: CAS to a refunded terminal state, credit the reserve back
    /// to the payee, append the compensating refund transaction
    ///
    /// The refund and the state flip are one unit: if the CAS loses, no
    /// credit is applied and the caller sees `false`.
    async fn refund_withdrawal(
        &self,
        id: WithdrawalId,
        expected: WithdrawalState,
        new: WithdrawalState,
        patch: WithdrawalPatch,
        refund_tx: Transaction,
    ) -> Result<bool, BillingError>;

    /// Newest-first withdrawal history for a payee
    async fn list_withdrawals(
        &self,
        payee: AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Withdrawal>, BillingError>;
}

/// Gift catalog
#[async_trait]
pub trait GiftStore: Send + Sync {
    async fn upsert_gift(&self, gift: Gift) -> Result<(), BillingError>;

    async fn gift(&self, id: GiftId) -> Result<Option<Gift>, BillingError>;

    async fn list_active_gifts(&self) -> Result<Vec<Gift>, BillingError>;

    /// Bump send counters after a settled gift (best-effort)
    async fn bump_gift_counters(
        &self,
        id: GiftId,
        quantity: u32,
        gross: Coins,
    ) -> Result<(), BillingError>;
}
