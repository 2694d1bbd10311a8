//! Monetary types
//!
//! All balances and transfer amounts are fixed-point decimals with scale 4,
//! stored as NUMERIC(19,4). Construction goes through these newtypes so that
//! positivity and precision rules are enforced once, at the boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits carried by every monetary value
pub const MONEY_SCALE: u32 = 4;

/// Total significant digits of the NUMERIC(19,4) storage columns
const MONEY_PRECISION: u32 = 19;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount must be greater than zero")]
    NotPositive,

    #[error("Amount precision exceeds {MONEY_SCALE} decimal places")]
    ScaleExceeded,

    #[error("Amount exceeds representable range")]
    OutOfRange,

    #[error("Amount is not a valid decimal: {0}")]
    Malformed(String),
}

fn check_representable(value: Decimal) -> Result<Decimal, MoneyError> {
    if value.scale() > MONEY_SCALE {
        return Err(MoneyError::ScaleExceeded);
    }
    // 19 total digits at scale 4 leaves 15 integral digits
    let limit = Decimal::from(10i64.pow(MONEY_PRECISION - MONEY_SCALE));
    if value.abs() >= limit {
        return Err(MoneyError::OutOfRange);
    }
    let mut value = value;
    value.rescale(MONEY_SCALE);
    Ok(value)
}

/// A strictly positive transfer amount, scale 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value <= Decimal::ZERO {
            return Err(MoneyError::NotPositive);
        }
        Ok(Self(check_representable(value)?))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// The delta a debit prepare carries: `-amount`
    pub fn debit_delta(&self) -> SignedAmount {
        SignedAmount(-self.0)
    }

    /// The delta a credit prepare carries: `+amount`
    pub fn credit_delta(&self) -> SignedAmount {
        SignedAmount(self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(a: Amount) -> Decimal {
        a.0
    }
}

impl FromStr for Amount {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s).map_err(|e| MoneyError::Malformed(e.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed balance delta, scale 4. Debits are negative, credits positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct SignedAmount(Decimal);

impl SignedAmount {
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value.is_zero() {
            return Err(MoneyError::NotPositive);
        }
        Ok(Self(check_representable(value)?))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative()
    }

    /// Magnitude of the delta as a positive Amount
    pub fn magnitude(&self) -> Amount {
        Amount(self.0.abs())
    }
}

impl TryFrom<Decimal> for SignedAmount {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SignedAmount> for Decimal {
    fn from(a: SignedAmount) -> Decimal {
        a.0
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_amount_positive_only() {
        assert!(Amount::new(dec("0.0001")).is_ok());
        assert!(Amount::new(dec("50")).is_ok());
        assert_eq!(Amount::new(dec("0")), Err(MoneyError::NotPositive));
        assert_eq!(Amount::new(dec("-1")), Err(MoneyError::NotPositive));
    }

    #[test]
    fn test_amount_scale_limit() {
        assert!(Amount::new(dec("1.1234")).is_ok());
        assert_eq!(Amount::new(dec("1.12345")), Err(MoneyError::ScaleExceeded));
    }

    #[test]
    fn test_amount_range_limit() {
        // 15 integral digits is the NUMERIC(19,4) ceiling
        assert!(Amount::new(dec("999999999999999.9999")).is_ok());
        assert_eq!(
            Amount::new(dec("1000000000000000")),
            Err(MoneyError::OutOfRange)
        );
    }

    #[test]
    fn test_amount_rescaled_to_four() {
        let a = Amount::new(dec("50")).unwrap();
        assert_eq!(a.to_string(), "50.0000");
        assert_eq!(a.as_decimal().scale(), MONEY_SCALE);
    }

    #[test]
    fn test_debit_credit_deltas() {
        let a = Amount::new(dec("25.5")).unwrap();
        assert!(a.debit_delta().is_negative());
        assert!(!a.credit_delta().is_negative());
        assert_eq!(a.debit_delta().magnitude(), a);
        assert_eq!(a.credit_delta().magnitude(), a);
    }

    #[test]
    fn test_signed_amount_rejects_zero() {
        assert!(SignedAmount::new(dec("0.0000")).is_err());
        assert!(SignedAmount::new(dec("-0.5")).is_ok());
    }

    #[test]
    fn test_amount_from_str() {
        assert!("12.34".parse::<Amount>().is_ok());
        assert!("abc".parse::<Amount>().is_err());
        assert!("-12".parse::<Amount>().is_err());
    }

    #[test]
    fn test_serde_accepts_numbers_and_strings() {
        let a: Amount = serde_json::from_str("50").unwrap();
        assert_eq!(a, Amount::new(dec("50")).unwrap());
        let b: Amount = serde_json::from_str("\"0.5\"").unwrap();
        assert_eq!(b, Amount::new(dec("0.5")).unwrap());
        assert!(serde_json::from_str::<Amount>("0").is_err());
        assert!(serde_json::from_str::<Amount>("-3").is_err());
    }
}
