//! Withdrawal ledger
//!
//! Payee cash-outs with reserve-on-request semantics: the coins leave the
//! wallet when the request is recorded, and come back through a compensating
//! refund transaction if the request is rejected or the payout fails.

pub mod service;
pub mod state;
pub mod types;

// Re-exports for convenience
pub use service::WithdrawalService;
pub use state::WithdrawalState;
pub use types::{Withdrawal, WithdrawalAction, WithdrawalId};
