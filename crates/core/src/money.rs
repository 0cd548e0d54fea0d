//! Currency amounts in integer minor units.

use core::ops::{Add, AddAssign, Neg, Sub};
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// An amount of money in the smallest currency unit (cents).
///
/// Values are compared by amount; there is a single operating currency.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Convert a decimal amount (as delivered by JSON APIs) to cents, rounding
    /// half away from zero.
    pub fn from_decimal(amount: f64) -> Result<Self, DomainError> {
        if !amount.is_finite() {
            return Err(DomainError::validation(format!("amount is not finite: {amount}")));
        }
        let cents = (amount * 100.0).round();
        if cents.abs() > i64::MAX as f64 {
            return Err(DomainError::validation(format!("amount out of range: {amount}")));
        }
        Ok(Self(cents as i64))
    }

    /// Decimal view of the amount; lossy, for arithmetic with rates only.
    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Multiply by a (possibly fractional) quantity, rounding to cents.
    pub fn times(&self, quantity: f64) -> Money {
        Money((self.0 as f64 * quantity).round() as i64)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl core::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Parses plain decimal text such as `"12.5"`, `"-0.99"` or `"3"`.
///
/// Accepts `,` as the decimal separator too; more than two fractional digits
/// is rejected rather than silently rounded.
impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().replace(',', ".");
        let (negative, body) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.as_str()),
        };

        let (whole, frac) = body.split_once('.').unwrap_or((body, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(DomainError::validation(format!("empty amount: {s:?}")));
        }
        if frac.len() > 2 {
            return Err(DomainError::validation(format!("too many decimal places: {s:?}")));
        }
        let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(DomainError::validation(format!("not a decimal amount: {s:?}")));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| DomainError::validation(format!("amount out of range: {s:?}")))?
        };
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().unwrap_or(0) * 10,
            _ => frac.parse::<i64>().unwrap_or(0),
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .ok_or_else(|| DomainError::validation(format!("amount out of range: {s:?}")))?;

        Ok(Self(if negative { -cents } else { cents }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_two_decimals() {
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-150).to_string(), "-1.50");
    }

    #[test]
    fn parses_decimal_text() {
        assert_eq!("12.5".parse::<Money>().unwrap(), Money::from_cents(1250));
        assert_eq!("3".parse::<Money>().unwrap(), Money::from_cents(300));
        assert_eq!("0,99".parse::<Money>().unwrap(), Money::from_cents(99));
        assert_eq!("-1.05".parse::<Money>().unwrap(), Money::from_cents(-105));
        assert!("1.234".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
    }

    #[test]
    fn from_decimal_rounds_half_away_from_zero() {
        assert_eq!(Money::from_decimal(0.125).unwrap().cents(), 13);
        assert_eq!(Money::from_decimal(-0.125).unwrap().cents(), -13);
        assert_eq!(Money::from_decimal(12.5).unwrap().cents(), 1250);
        assert!(Money::from_decimal(f64::NAN).is_err());
    }

    #[test]
    fn times_fractional_quantity() {
        let kilo = Money::from_cents(1999);
        assert_eq!(kilo.times(0.5), Money::from_cents(1000));
        assert_eq!(kilo.times(3.0), Money::from_cents(5997));
    }

    #[test]
    fn sums() {
        let total: Money = [100, 250, -50].into_iter().map(Money::from_cents).sum();
        assert_eq!(total, Money::from_cents(300));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: display output parses back to the same amount.
            #[test]
            fn display_parses_back(cents in -10_000_000i64..10_000_000i64) {
                let m = Money::from_cents(cents);
                prop_assert_eq!(m.to_string().parse::<Money>().unwrap(), m);
            }
        }
    }
}
