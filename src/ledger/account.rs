//! Account models
//!
//! Users pay for metered sessions and gifts; payees earn net of commission.
//! Balances are NOT stored here - they live behind the ledger store and are
//! mutated only through ledger operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commission::DEFAULT_COMMISSION_PCT;
use crate::core_types::{AccountId, Coins, CommissionPct, ServiceType};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    /// Pays for sessions and gifts
    User = 1,
    /// Provides metered services, earns net of commission
    Payee = 2,
}

impl AccountRole {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(AccountRole::User),
            2 => Some(AccountRole::Payee),
            _ => None,
        }
    }
}

/// Account status
///
/// Accounts referenced by transactions are never hard-deleted; they are
/// soft-deactivated instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Deactivated = 0,
    Active = 1,
}

impl AccountStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }
}

impl From<i16> for AccountStatus {
    fn from(v: i16) -> Self {
        match v {
            0 => AccountStatus::Deactivated,
            _ => AccountStatus::Active,
        }
    }
}

/// Payee presence, as reported by the realtime layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Offline = 0,
    Online = 1,
    Busy = 2,
}

impl Presence {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }
}

impl From<i16> for Presence {
    fn from(v: i16) -> Self {
        match v {
            1 => Presence::Online,
            2 => Presence::Busy,
            _ => Presence::Offline,
        }
    }
}

/// Per-minute rates a payee charges, by service type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    pub chat: Coins,
    pub voice: Coins,
    pub video: Coins,
}

impl RateCard {
    pub fn new(chat: Coins, voice: Coins, video: Coins) -> Self {
        Self { chat, voice, video }
    }

    /// Flat rate across all service types
    pub fn flat(rate: Coins) -> Self {
        Self {
            chat: rate,
            voice: rate,
            video: rate,
        }
    }

    /// Resolve the per-minute rate for a service type
    #[inline]
    pub fn rate_for(&self, service: ServiceType) -> Coins {
        match service {
            ServiceType::Chat => self.chat,
            ServiceType::Voice => self.voice,
            ServiceType::Video => self.video,
        }
    }
}

/// Payout destination for withdrawals
///
/// Snapshot semantics: a withdrawal copies these fields at request time so a
/// later edit cannot redirect an in-flight payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDetails {
    pub account_holder: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub bank_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Lifetime earning counters for a payee
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayeeStats {
    /// Net coins earned across all settlements
    pub total_earned: Coins,
    /// Total billed session time
    pub total_billed_seconds: u64,
    /// Number of settled sessions
    pub sessions_settled: u64,
}

/// A billing account (user or payee)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub role: AccountRole,
    pub display_name: String,
    pub status: AccountStatus,
    pub presence: Presence,
    /// Platform cut applied to this payee's gross earnings
    pub commission_pct: CommissionPct,
    pub rates: RateCard,
    pub payout: Option<PayoutDetails>,
    pub stats: PayeeStats,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// New paying user account
    pub fn new_user(account_id: AccountId, display_name: impl Into<String>) -> Self {
        Self {
            account_id,
            role: AccountRole::User,
            display_name: display_name.into(),
            status: AccountStatus::Active,
            presence: Presence::Offline,
            commission_pct: 0,
            rates: RateCard::default(),
            payout: None,
            stats: PayeeStats::default(),
            created_at: Utc::now(),
        }
    }

    /// New payee account with the default platform commission
    pub fn new_payee(
        account_id: AccountId,
        display_name: impl Into<String>,
        rates: RateCard,
    ) -> Self {
        Self {
            account_id,
            role: AccountRole::Payee,
            display_name: display_name.into(),
            status: AccountStatus::Active,
            presence: Presence::Offline,
            commission_pct: DEFAULT_COMMISSION_PCT,
            rates,
            payout: None,
            stats: PayeeStats::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_commission(mut self, pct: CommissionPct) -> Self {
        self.commission_pct = pct;
        self
    }

    pub fn with_payout(mut self, payout: PayoutDetails) -> Self {
        self.payout = Some(payout);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Whether this account can be the payee of a new metered session
    pub fn accepts_sessions(&self) -> bool {
        self.role == AccountRole::Payee
            && self.is_active()
            && self.presence == Presence::Online
    }

    /// Whether this account can receive gifts
    pub fn accepts_gifts(&self) -> bool {
        self.role == AccountRole::Payee && self.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_card_lookup() {
        let rates = RateCard::new(5, 10, 15);
        assert_eq!(rates.rate_for(ServiceType::Chat), 5);
        assert_eq!(rates.rate_for(ServiceType::Voice), 10);
        assert_eq!(rates.rate_for(ServiceType::Video), 15);

        let flat = RateCard::flat(8);
        assert_eq!(flat.rate_for(ServiceType::Video), 8);
    }

    #[test]
    fn test_accepts_sessions() {
        let mut payee = Account::new_payee(1, "mira", RateCard::flat(10));
        assert!(!payee.accepts_sessions()); // offline by default

        payee.presence = Presence::Online;
        assert!(payee.accepts_sessions());

        payee.presence = Presence::Busy;
        assert!(!payee.accepts_sessions());

        payee.presence = Presence::Online;
        payee.status = AccountStatus::Deactivated;
        assert!(!payee.accepts_sessions());
    }

    #[test]
    fn test_user_never_accepts_sessions() {
        let mut user = Account::new_user(2, "sam");
        user.presence = Presence::Online;
        assert!(!user.accepts_sessions());
        assert!(!user.accepts_gifts());
    }

    #[test]
    fn test_default_commission() {
        let payee = Account::new_payee(1, "mira", RateCard::flat(10));
        assert_eq!(payee.commission_pct, DEFAULT_COMMISSION_PCT);
        assert_eq!(payee.with_commission(30).commission_pct, 30);
    }
}
