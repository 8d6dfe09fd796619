//! Rate engine
//!
//! Converts elapsed session time into billable units and a gross coin charge.
//! Billing granularity is one minute: elapsed seconds round UP to the next
//! whole minute, so a session below one minute bills as one full minute.

use crate::core_types::Coins;
use crate::error::BillingError;

/// Seconds per billable unit (one minute)
pub const SECONDS_PER_UNIT: u64 = 60;

/// A computed charge for a metered session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charge {
    /// Whole minutes billed, elapsed seconds rounded up
    pub billable_units: u64,
    /// `billable_units * rate_per_minute`
    pub gross: Coins,
}

/// Compute the gross charge for an elapsed duration at a per-minute rate.
///
/// The rate is resolved from the payee's rate card before calling; the
/// service type does not enter the arithmetic.
///
/// # Errors
/// - `InvalidDuration` if `elapsed_seconds <= 0`
/// - `InvalidAmount` if the charge overflows
///
/// # Example
/// ```
/// use amora_billing::rate::compute_charge;
/// // 61 seconds at 10 coins/min rounds up to 2 minutes
/// let c = compute_charge(10, 61).unwrap();
/// assert_eq!(c.billable_units, 2);
/// assert_eq!(c.gross, 20);
/// ```
#[inline]
pub fn compute_charge(rate_per_minute: Coins, elapsed_seconds: i64) -> Result<Charge, BillingError> {
    if elapsed_seconds <= 0 {
        return Err(BillingError::InvalidDuration);
    }
    let billable_units = (elapsed_seconds as u64).div_ceil(SECONDS_PER_UNIT);
    let gross = billable_units
        .checked_mul(rate_per_minute)
        .ok_or(BillingError::InvalidAmount)?;
    Ok(Charge {
        billable_units,
        gross,
    })
}
