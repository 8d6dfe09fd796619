//! Transaction records
//!
//! Every balance movement appends exactly one immutable transaction. The
//! `reference` is globally unique and doubles as the idempotency key: a
//! retried settlement reuses its reference and the store rejects the second
//! insert instead of double-charging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{AccountId, Coins};

/// Transaction ID - ULID-based unique identifier
///
/// Using ULID provides:
/// - Monotonic, sortable IDs
/// - No coordination needed between writers
/// - 128-bit with good entropy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(ulid::Ulid);

impl TransactionId {
    /// Generate a new unique TransactionId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// What moved the coins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Gateway-verified wallet top-up
    Recharge = 1,
    /// Settlement of a metered chat/voice/video session
    SessionPayment = 2,
    /// One-shot gift settlement
    GiftPayment = 3,
    /// Payee balance reserved for cash-out
    Withdrawal = 4,
    /// Compensating credit (rejected/failed withdrawal)
    Refund = 5,
    /// Admin-initiated balance correction
    ManualAdjustment = 6,
}

impl TransactionKind {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TransactionKind::Recharge),
            2 => Some(TransactionKind::SessionPayment),
            3 => Some(TransactionKind::GiftPayment),
            4 => Some(TransactionKind::Withdrawal),
            5 => Some(TransactionKind::Refund),
            6 => Some(TransactionKind::ManualAdjustment),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Recharge => "recharge",
            TransactionKind::SessionPayment => "session_payment",
            TransactionKind::GiftPayment => "gift_payment",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Refund => "refund",
            TransactionKind::ManualAdjustment => "manual_adjustment",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction status
///
/// Transitions are forward-only:
/// `pending -> completed | failed`, `completed -> refunded`.
/// A transaction is never reopened; reversals are separate compensating
/// transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending = 10,
    Completed = 20,
    Refunded = 30,
    Failed = -10,
}

impl TransactionStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(TransactionStatus::Pending),
            20 => Some(TransactionStatus::Completed),
            30 => Some(TransactionStatus::Refunded),
            -10 => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal status (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Refunded | TransactionStatus::Failed)
    }

    /// Whether a forward transition to `next` is legal
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (
                TransactionStatus::Pending,
                TransactionStatus::Completed | TransactionStatus::Failed
            ) | (TransactionStatus::Completed, TransactionStatus::Refunded)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured references back into the domain that produced a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gift_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gift_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TransactionMetadata {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn for_gift(gift_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            gift_id: Some(gift_id.into()),
            gift_quantity: Some(quantity),
            ..Default::default()
        }
    }

    pub fn for_withdrawal(withdrawal_id: impl Into<String>) -> Self {
        Self {
            withdrawal_id: Some(withdrawal_id.into()),
            ..Default::default()
        }
    }

    pub fn for_order(order_id: impl Into<String>) -> Self {
        Self {
            order_id: Some(order_id.into()),
            ..Default::default()
        }
    }
}

/// An immutable ledger entry
///
/// # Invariants
/// - `net == gross - commission` (checked at construction)
/// - `reference` is globally unique (UNIQUE constraint at the store)
/// - created once; only `status` (and `metadata.payment_id`) may change,
///   forward-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub gross: Coins,
    pub commission: Coins,
    pub net: Coins,
    pub payer: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<AccountId>,
    pub reference: String,
    pub metadata: TransactionMetadata,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build a completed two-party transaction (settlements)
    pub fn completed(
        kind: TransactionKind,
        payer: AccountId,
        payee: AccountId,
        gross: Coins,
        commission: Coins,
        reference: impl Into<String>,
        metadata: TransactionMetadata,
    ) -> Self {
        debug_assert!(commission <= gross);
        Self {
            transaction_id: TransactionId::new(),
            kind,
            status: TransactionStatus::Completed,
            gross,
            commission,
            net: gross - commission,
            payer,
            payee: Some(payee),
            reference: reference.into(),
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Build a single-party transaction (recharge, refund, adjustment)
    ///
    /// `payer` here is the account whose balance moves; there is no
    /// counterparty and no commission.
    pub fn single_party(
        kind: TransactionKind,
        status: TransactionStatus,
        account: AccountId,
        amount: Coins,
        reference: impl Into<String>,
        metadata: TransactionMetadata,
    ) -> Self {
        Self {
            transaction_id: TransactionId::new(),
            kind,
            status,
            gross: amount,
            commission: 0,
            net: amount,
            payer: account,
            payee: None,
            reference: reference.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_id_roundtrip() {
        let kinds = [
            TransactionKind::Recharge,
            TransactionKind::SessionPayment,
            TransactionKind::GiftPayment,
            TransactionKind::Withdrawal,
            TransactionKind::Refund,
            TransactionKind::ManualAdjustment,
        ];
        for kind in kinds {
            assert_eq!(TransactionKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(TransactionKind::from_id(0), None);
    }

    #[test]
    fn test_status_transitions() {
        use TransactionStatus::*;

        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Refunded));

        assert!(!Completed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Refunded.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Refunded));
    }

    #[test]
    fn test_status_id_roundtrip() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            TransactionStatus::Refunded,
            TransactionStatus::Failed,
        ] {
            assert_eq!(TransactionStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(TransactionStatus::from_id(999), None);
    }

    #[test]
    fn test_completed_transaction_net() {
        let tx = Transaction::completed(
            TransactionKind::SessionPayment,
            1,
            2,
            20,
            4,
            "session_x",
            TransactionMetadata::for_session("x"),
        );
        assert_eq!(tx.net, 16);
        assert_eq!(tx.gross, tx.commission + tx.net);
        assert_eq!(tx.payee, Some(2));
    }

    #[test]
    fn test_transaction_id_parse() {
        let id = TransactionId::new();
        let parsed: TransactionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
