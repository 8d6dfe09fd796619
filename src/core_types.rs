//! Core types used throughout the billing engine
//!
//! These are fundamental identifier and amount types used by all modules.
//! They provide semantic meaning and enable future type evolution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account ID - globally unique, immutable after assignment.
///
/// # Usage:
/// - Primary key for user and payee accounts
/// - Supplied by the authentication layer; the billing core never mints these
pub type AccountId = u64;

/// Coin amount - the platform's internal unit of value.
///
/// Coins are indivisible integers. Conversion to/from real currency happens
/// only at the gateway (recharge) and payout (withdrawal) boundaries, outside
/// this crate. All arithmetic on coins uses u128 intermediates or checked ops.
pub type Coins = u64;

/// Commission percentage, whole percent in [0, 100].
pub type CommissionPct = u8;

/// Metered service type for a billable session.
///
/// Stored as SMALLINT; the numeric IDs are part of the storage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Chat = 1,
    Voice = 2,
    Video = 3,
}

impl ServiceType {
    /// Get the numeric ID for storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from a storage ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(ServiceType::Chat),
            2 => Some(ServiceType::Voice),
            3 => Some(ServiceType::Video),
            _ => None,
        }
    }

    /// Get human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Chat => "chat",
            ServiceType::Voice => "voice",
            ServiceType::Video => "video",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(ServiceType::Chat),
            "voice" | "audio" => Ok(ServiceType::Voice),
            "video" => Ok(ServiceType::Video),
            _ => Err(format!("Invalid service type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_id_roundtrip() {
        for svc in [ServiceType::Chat, ServiceType::Voice, ServiceType::Video] {
            assert_eq!(ServiceType::from_id(svc.id()), Some(svc));
        }
        assert_eq!(ServiceType::from_id(99), None);
    }

    #[test]
    fn test_service_type_parse() {
        assert_eq!("chat".parse::<ServiceType>().unwrap(), ServiceType::Chat);
        // Legacy clients send "audio" for voice calls
        assert_eq!("audio".parse::<ServiceType>().unwrap(), ServiceType::Voice);
        assert_eq!("VIDEO".parse::<ServiceType>().unwrap(), ServiceType::Video);
        assert!("carrier-pigeon".parse::<ServiceType>().is_err());
    }
}
