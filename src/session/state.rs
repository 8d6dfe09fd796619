//! Session FSM State Definitions
//!
//! State IDs are designed for storage as SMALLINT.
//! Terminal states: ENDED (30), CANCELLED (-10), FAILED (-20)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session FSM States
///
/// ```text
/// ACTIVE → SETTLING → ENDED
///    ↓
/// CANCELLED | FAILED
/// ```
///
/// SETTLING is the persist-before-settle guard: exactly one caller wins the
/// ACTIVE→SETTLING CAS and runs settlement; everyone else either waits out
/// the resume path or gets the recorded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Billable clock is running
    Active = 10,

    /// Settlement claimed but not yet recorded - funds may be IN-FLIGHT.
    /// CRITICAL: must eventually reach ENDED (resume path or recovery worker)
    Settling = 20,

    /// Terminal: settled, session record immutable
    Ended = 30,

    /// Terminal: torn down before any billable time (payee rejected,
    /// media never connected) - nothing billed
    Cancelled = -10,

    /// Terminal: setup failed before the session became billable
    Failed = -20,
}

impl SessionState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Ended | SessionState::Cancelled | SessionState::Failed
        )
    }

    /// Check if settlement is in flight (claimed but not recorded)
    #[inline]
    pub fn is_settling(&self) -> bool {
        matches!(self, SessionState::Settling)
    }

    /// Get the numeric state ID for storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from a storage state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(SessionState::Active),
            20 => Some(SessionState::Settling),
            30 => Some(SessionState::Ended),
            -10 => Some(SessionState::Cancelled),
            -20 => Some(SessionState::Failed),
            _ => None,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "ACTIVE",
            SessionState::Settling => "SETTLING",
            SessionState::Ended => "ENDED",
            SessionState::Cancelled => "CANCELLED",
            SessionState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Ended.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(SessionState::Failed.is_terminal());

        assert!(!SessionState::Active.is_terminal());
        assert!(!SessionState::Settling.is_terminal());
    }

    #[test]
    fn test_settling_state() {
        assert!(SessionState::Settling.is_settling());
        assert!(!SessionState::Active.is_settling());
        assert!(!SessionState::Ended.is_settling());
    }

    #[test]
    fn test_state_id_roundtrip() {
        let states = [
            SessionState::Active,
            SessionState::Settling,
            SessionState::Ended,
            SessionState::Cancelled,
            SessionState::Failed,
        ];

        for state in states {
            assert_eq!(SessionState::from_id(state.id()), Some(state));
        }
    }

    #[test]
    fn test_invalid_state_id() {
        assert!(SessionState::from_id(999).is_none());
        assert!(SessionState::from_id(-999).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::Active.to_string(), "ACTIVE");
        assert_eq!(SessionState::Settling.to_string(), "SETTLING");
        assert_eq!(SessionState::Ended.to_string(), "ENDED");
    }
}
