//! Session record and settlement result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::state::SessionState;
use crate::core_types::{AccountId, Coins, ServiceType};
use crate::ledger::TransactionId;

/// Session ID - ULID-based unique identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(ulid::Ulid);

impl SessionId {
    /// Generate a new unique SessionId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// A metered chat/voice/video session between one payer and one payee
///
/// Mutated only by the session meter; immutable once `state` is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub payer: AccountId,
    pub payee: AccountId,
    pub service: ServiceType,
    /// Rate snapshot taken at start; later rate-card edits don't affect a
    /// running session
    pub rate_per_minute: Coins,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    /// Set when the session leaves ACTIVE; the billing clock stops here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Whole minutes actually charged
    pub billed_units: u64,
    /// Elapsed whole minutes the payer could not cover
    pub shortfall_units: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_tx: Option<TransactionId>,
    /// Bumped on every state change; drives stale-session recovery scans
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Open a new active session
    pub fn open(
        payer: AccountId,
        payee: AccountId,
        service: ServiceType,
        rate_per_minute: Coins,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: SessionId::new(),
            payer,
            payee,
            service,
            rate_per_minute,
            state: SessionState::Active,
            started_at: now,
            ended_at: None,
            billed_units: 0,
            shortfall_units: 0,
            settlement_tx: None,
            updated_at: now,
        }
    }

    /// Stable idempotency reference for this session's settlement transaction
    ///
    /// Derived from the session id so every settlement retry collides on the
    /// store's UNIQUE constraint instead of double-charging.
    pub fn settlement_reference(&self) -> String {
        format!("session_{}", self.session_id)
    }

    /// Billable seconds between start and the recorded end
    ///
    /// Clamped to a 1-second minimum: a same-second hangup still bills the
    /// one-minute floor.
    pub fn elapsed_seconds(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_seconds().max(1))
    }
}

/// How a session settlement came out
///
/// Settlement always runs at session end; the variants distinguish whether
/// the payer's balance covered the full elapsed charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Full elapsed charge collected
    Settled {
        transaction: TransactionId,
        billed_units: u64,
        gross: Coins,
        commission: Coins,
        net: Coins,
    },
    /// Balance drifted below the elapsed charge; collected the maximum
    /// affordable whole-minute charge and logged the shortfall
    PartiallySettled {
        transaction: TransactionId,
        billed_units: u64,
        shortfall_units: u64,
        gross: Coins,
        commission: Coins,
        net: Coins,
    },
    /// Balance could not cover even one minute; nothing moved, no
    /// transaction written
    Unbillable { shortfall_units: u64 },
}

impl SettlementOutcome {
    /// Transaction recorded by this settlement, if any coins moved
    pub fn transaction(&self) -> Option<TransactionId> {
        match self {
            SettlementOutcome::Settled { transaction, .. }
            | SettlementOutcome::PartiallySettled { transaction, .. } => Some(*transaction),
            SettlementOutcome::Unbillable { .. } => None,
        }
    }

    /// Minutes actually charged
    pub fn billed_units(&self) -> u64 {
        match self {
            SettlementOutcome::Settled { billed_units, .. }
            | SettlementOutcome::PartiallySettled { billed_units, .. } => *billed_units,
            SettlementOutcome::Unbillable { .. } => 0,
        }
    }

    /// Elapsed whole minutes that went uncharged
    pub fn shortfall_units(&self) -> u64 {
        match self {
            SettlementOutcome::Settled { .. } => 0,
            SettlementOutcome::PartiallySettled {
                shortfall_units, ..
            }
            | SettlementOutcome::Unbillable { shortfall_units } => *shortfall_units,
        }
    }

    /// Net coins credited to the payee
    pub fn net(&self) -> Coins {
        match self {
            SettlementOutcome::Settled { net, .. }
            | SettlementOutcome::PartiallySettled { net, .. } => *net,
            SettlementOutcome::Unbillable { .. } => 0,
        }
    }
}

/// Result of ending a session: the final record plus how settlement went
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndReceipt {
    pub session: Session,
    pub outcome: SettlementOutcome,
}

/// Why a session ended
///
/// Abnormal terminations settle exactly like a normal hangup - elapsed time
/// up to termination is never free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Either party hung up normally
    Hangup,
    /// Counterpart left / transport dropped
    ConnectionLost,
    /// Inactivity timeout enforced outside the core
    InactivityTimeout,
    /// Settlement re-driven by the recovery worker
    Recovery,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Hangup => "hangup",
            EndReason::ConnectionLost => "connection_lost",
            EndReason::InactivityTimeout => "inactivity_timeout",
            EndReason::Recovery => "recovery",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_elapsed_seconds() {
        let now = Utc::now();
        let mut session = Session::open(1, 2, ServiceType::Voice, 10, now);
        assert_eq!(session.elapsed_seconds(), None);

        session.ended_at = Some(now + Duration::seconds(90));
        assert_eq!(session.elapsed_seconds(), Some(90));
    }

    #[test]
    fn test_elapsed_seconds_clamped() {
        let now = Utc::now();
        let mut session = Session::open(1, 2, ServiceType::Chat, 5, now);
        // Same-second hangup still counts one billable second
        session.ended_at = Some(now);
        assert_eq!(session.elapsed_seconds(), Some(1));
    }

    #[test]
    fn test_settlement_reference_is_stable() {
        let session = Session::open(1, 2, ServiceType::Video, 15, Utc::now());
        assert_eq!(session.settlement_reference(), session.settlement_reference());
        assert!(session
            .settlement_reference()
            .starts_with("session_"));
    }

    #[test]
    fn test_outcome_accessors() {
        let tx = TransactionId::new();
        let settled = SettlementOutcome::Settled {
            transaction: tx,
            billed_units: 2,
            gross: 20,
            commission: 4,
            net: 16,
        };
        assert_eq!(settled.transaction(), Some(tx));
        assert_eq!(settled.billed_units(), 2);
        assert_eq!(settled.net(), 16);

        let unbillable = SettlementOutcome::Unbillable { shortfall_units: 3 };
        assert_eq!(unbillable.transaction(), None);
        assert_eq!(unbillable.billed_units(), 0);
        assert_eq!(unbillable.net(), 0);
    }
}
