//! Withdrawal FSM State Definitions
//!
//! State IDs are designed for storage as SMALLINT.
//! Terminal states: COMPLETED (30), REJECTED (-10), FAILED (-20)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Withdrawal FSM States
///
/// ```text
/// PENDING → PROCESSING → COMPLETED
///    ↓           ↓
/// REJECTED    FAILED
/// ```
///
/// The payee's coins are debited (reserved) at request time, before PENDING
/// is ever visible. REJECTED and FAILED both carry a compensating refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalState {
    /// Requested, coins reserved, awaiting admin review
    Pending = 10,

    /// Approved; off-platform payout in flight
    Processing = 20,

    /// Terminal: payout confirmed with an external reference
    Completed = 30,

    /// Terminal: admin rejected; reserve refunded
    Rejected = -10,

    /// Terminal: payout failed after approval; reserve refunded
    Failed = -20,
}

impl WithdrawalState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalState::Completed | WithdrawalState::Rejected | WithdrawalState::Failed
        )
    }

    /// States that end with the reserve refunded to the payee
    #[inline]
    pub fn is_refunded(&self) -> bool {
        matches!(self, WithdrawalState::Rejected | WithdrawalState::Failed)
    }

    /// Get the numeric state ID for storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from a storage state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(WithdrawalState::Pending),
            20 => Some(WithdrawalState::Processing),
            30 => Some(WithdrawalState::Completed),
            -10 => Some(WithdrawalState::Rejected),
            -20 => Some(WithdrawalState::Failed),
            _ => None,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalState::Pending => "PENDING",
            WithdrawalState::Processing => "PROCESSING",
            WithdrawalState::Completed => "COMPLETED",
            WithdrawalState::Rejected => "REJECTED",
            WithdrawalState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for WithdrawalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(WithdrawalState::Completed.is_terminal());
        assert!(WithdrawalState::Rejected.is_terminal());
        assert!(WithdrawalState::Failed.is_terminal());

        assert!(!WithdrawalState::Pending.is_terminal());
        assert!(!WithdrawalState::Processing.is_terminal());
    }

    #[test]
    fn test_refunded_states() {
        assert!(WithdrawalState::Rejected.is_refunded());
        assert!(WithdrawalState::Failed.is_refunded());
        assert!(!WithdrawalState::Completed.is_refunded());
        assert!(!WithdrawalState::Pending.is_refunded());
    }

    #[test]
    fn test_state_id_roundtrip() {
        let states = [
            WithdrawalState::Pending,
            WithdrawalState::Processing,
            WithdrawalState::Completed,
            WithdrawalState::Rejected,
            WithdrawalState::Failed,
        ];

        for state in states {
            assert_eq!(WithdrawalState::from_id(state.id()), Some(state));
        }
        assert!(WithdrawalState::from_id(999).is_none());
    }
}
