//! Session metering
//!
//! Converts a timed interaction into exactly one settlement.
//!
//! # State Machine
//!
//! ```text
//! ACTIVE → SETTLING → ENDED
//!    ↓
//! CANCELLED | FAILED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Claim-Before-Settle**: the ACTIVE→SETTLING CAS elects exactly one
//!    settler and freezes the billing clock
//! 2. **Idempotency**: the settlement transfer is keyed by a session-derived
//!    reference; retries collide instead of double-charging
//! 3. **Never Free, Never Negative**: abnormal termination settles elapsed
//!    time; a drifted balance truncates the charge rather than overdrawing

pub mod meter;
pub mod state;
pub mod types;
pub mod worker;

// Re-exports for convenience
pub use meter::SessionMeter;
pub use state::SessionState;
pub use types::{EndReason, EndReceipt, Session, SessionId, SettlementOutcome};
pub use worker::{RecoveryConfig, RecoveryWorker};
