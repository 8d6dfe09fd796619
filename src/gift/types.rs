//! Gift catalog types
//!
//! Catalog entries are read-only inputs to gift settlement; admins manage
//! them out of band. Counters are the only fields the billing path touches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::Coins;

/// Gift ID - ULID-based unique identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GiftId(ulid::Ulid);

impl GiftId {
    /// Generate a new unique GiftId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for GiftId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GiftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GiftId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// A catalog gift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gift {
    pub gift_id: GiftId,
    pub name: String,
    pub price_coins: Coins,
    pub is_active: bool,
    /// Sendable from this instant
    pub valid_from: DateTime<Utc>,
    /// Sendable strictly before this instant, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Number of times this gift has been sent (settled sends only)
    pub purchase_count: u64,
    /// Gross coins moved through this gift
    pub total_coins: Coins,
    pub created_at: DateTime<Utc>,
}

impl Gift {
    /// New active gift with an open-ended validity window
    pub fn new(name: impl Into<String>, price_coins: Coins) -> Self {
        let now = Utc::now();
        Self {
            gift_id: GiftId::new(),
            name: name.into(),
            price_coins,
            is_active: true,
            valid_from: now,
            valid_until: None,
            purchase_count: 0,
            total_coins: 0,
            created_at: now,
        }
    }

    pub fn with_validity(
        mut self,
        from: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    /// Whether the gift can be sent right now
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && now >= self.valid_from
            && self.valid_until.is_none_or(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_availability_window() {
        let now = Utc::now();
        let gift = Gift::new("rose", 50)
            .with_validity(now - Duration::hours(1), Some(now + Duration::hours(1)));

        assert!(gift.is_available(now));
        assert!(!gift.is_available(now - Duration::hours(2)));
        assert!(!gift.is_available(now + Duration::hours(2)));
        // The window end is exclusive
        assert!(!gift.is_available(now + Duration::hours(1)));
    }

    #[test]
    fn test_inactive_gift_unavailable() {
        let mut gift = Gift::new("rose", 50);
        assert!(gift.is_available(Utc::now()));

        gift.is_active = false;
        assert!(!gift.is_available(Utc::now()));
    }

    #[test]
    fn test_open_ended_window() {
        let gift = Gift::new("rose", 50);
        assert!(gift.is_available(Utc::now() + Duration::days(365)));
    }
}
