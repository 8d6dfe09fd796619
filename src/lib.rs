//! amora_billing - Metered-session billing and coin ledger engine
//!
//! The wallet core of a social calling platform: timed chat/voice/video
//! sessions convert elapsed minutes into coin charges, coins move from payer
//! to payee net of platform commission, and every movement leaves exactly
//! one immutable transaction behind.
//!
//! # Modules
//!
//! - [`core_types`] - Id aliases, coin amounts, service types
//! - [`error`] - The `BillingError` taxonomy
//! - [`commission`] - Gross-to-net commission split (floor toward platform)
//! - [`rate`] - Elapsed time to billable minutes and gross charge
//! - [`balance`] - Enforced wallet balance type
//! - [`ledger`] - Accounts, transactions, and the validated `Ledger` service
//! - [`session`] - Session meter FSM with exactly-once settlement
//! - [`gift`] - One-shot gift settlement over a catalog
//! - [`withdrawal`] - Reserve-on-request payee cash-outs
//! - [`store`] - Storage traits plus Postgres and in-memory backends
//! - [`notify`] - Fire-and-forget notification fan-out
//! - [`config`] / [`logging`] - YAML config and tracing setup

// Core types - must be first!
pub mod core_types;

pub mod error;

// Pure billing math
pub mod commission;
pub mod rate;

// Ledger and balances
pub mod balance;
pub mod ledger;

// Settlement flows
pub mod gift;
pub mod session;
pub mod withdrawal;

// Infrastructure
pub mod config;
pub mod logging;
pub mod notify;
pub mod store;

// Convenient re-exports at crate root
pub use balance::Wallet;
pub use commission::{split, CommissionSplit};
pub use core_types::{AccountId, Coins, CommissionPct, ServiceType};
pub use error::BillingError;
pub use gift::{Gift, GiftCatalog, GiftId, GiftReceipt, GiftService};
pub use ledger::{
    Account, AccountRole, AccountStatus, AdjustDirection, Ledger, PayoutDetails, Presence,
    RateCard, Transaction, TransactionId, TransactionKind, TransactionMetadata,
    TransactionStatus,
};
pub use notify::{BillingEvent, LogNotifier, Notifier};
pub use rate::{compute_charge, Charge};
pub use session::{
    EndReason, EndReceipt, RecoveryConfig, RecoveryWorker, Session, SessionId, SessionMeter,
    SessionState, SettlementOutcome,
};
pub use store::{MemoryStore, PgStore};
pub use withdrawal::{
    Withdrawal, WithdrawalAction, WithdrawalId, WithdrawalService, WithdrawalState,
};
