//! Withdrawal record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::state::WithdrawalState;
use crate::core_types::{AccountId, Coins, CommissionPct};
use crate::ledger::{PayoutDetails, TransactionId};

/// Withdrawal ID - ULID-based unique identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WithdrawalId(ulid::Ulid);

impl WithdrawalId {
    /// Generate a new unique WithdrawalId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for WithdrawalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WithdrawalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WithdrawalId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// A payee cash-out request
///
/// The requested coins leave the payee's balance when the request is
/// recorded; REJECTED/FAILED states put them back via a compensating refund
/// transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub withdrawal_id: WithdrawalId,
    pub payee: AccountId,
    /// Coins reserved from the payee's balance
    pub amount: Coins,
    /// Cash-out commission snapshot at request time
    pub commission_pct: CommissionPct,
    pub commission: Coins,
    /// Coins the payout converts to cash: `amount - commission`
    pub payout_coins: Coins,
    /// Destination snapshot; later edits to the account can't redirect this
    pub payout: PayoutDetails,
    pub state: WithdrawalState,
    /// Transaction that reserved the coins
    pub reserve_tx: TransactionId,
    /// Compensating refund transaction (rejected/failed only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_tx: Option<TransactionId>,
    /// Off-platform payout reference recorded at completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout_reference: Option<String>,
    /// Admin account that processed the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    /// Stable reference for the reserve transaction
    pub fn reserve_reference(&self) -> String {
        format!("withdrawal_{}", self.withdrawal_id)
    }

    /// Stable reference for the compensating refund transaction
    pub fn refund_reference(&self) -> String {
        format!("refund_withdrawal_{}", self.withdrawal_id)
    }
}

/// Admin decision on a pending withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalAction {
    Approve,
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payout_details() -> PayoutDetails {
        PayoutDetails {
            account_holder: "Mira K".into(),
            account_number: "00112233".into(),
            ifsc_code: "TEST0001".into(),
            bank_name: "Test Bank".into(),
            branch: None,
        }
    }

    #[test]
    fn test_references_are_distinct() {
        let now = Utc::now();
        let w = Withdrawal {
            withdrawal_id: WithdrawalId::new(),
            payee: 7,
            amount: 500,
            commission_pct: 20,
            commission: 100,
            payout_coins: 400,
            payout: payout_details(),
            state: WithdrawalState::Pending,
            reserve_tx: TransactionId::new(),
            refund_tx: None,
            payout_reference: None,
            processed_by: None,
            reason: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_ne!(w.reserve_reference(), w.refund_reference());
        assert!(w.reserve_reference().contains(&w.withdrawal_id.to_string()));
    }

    #[test]
    fn test_withdrawal_id_parse() {
        let id = WithdrawalId::new();
        let parsed: WithdrawalId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
