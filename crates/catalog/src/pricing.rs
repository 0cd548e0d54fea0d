//! Price formulas used when quoting and building offers.
//!
//! Percentages are plain numbers (`30.0` means 30%). Results are rounded to
//! cents.

use backoffice_core::{DomainError, DomainResult, Money};

/// Selling price from cost plus a markup on cost.
///
/// `markup_price(10.00, 30.0) == 13.00`.
pub fn markup_price(cost: Money, markup_pct: f64) -> DomainResult<Money> {
    if !markup_pct.is_finite() || markup_pct < -100.0 {
        return Err(DomainError::validation(format!("invalid markup: {markup_pct}")));
    }
    Money::from_decimal(cost.as_decimal() * (1.0 + markup_pct / 100.0))
}

/// Selling price that yields the given margin on the selling price.
///
/// `margin_price(10.00, 20.0) == 12.50`.
pub fn margin_price(cost: Money, margin_pct: f64) -> DomainResult<Money> {
    if !margin_pct.is_finite() || !(0.0..100.0).contains(&margin_pct) {
        return Err(DomainError::validation(format!(
            "margin must be in [0, 100): {margin_pct}"
        )));
    }
    Money::from_decimal(cost.as_decimal() / (1.0 - margin_pct / 100.0))
}

/// Realized margin (percentage of the selling price).
pub fn margin_of(cost: Money, price: Money) -> DomainResult<f64> {
    if price.cents() == 0 {
        return Err(DomainError::validation("margin of a zero price is undefined"));
    }
    Ok((price.cents() - cost.cents()) as f64 / price.cents() as f64 * 100.0)
}

/// Snap a price to the nearest `x.99` ending.
///
/// Prices under 1.00 are left alone.
pub fn commercial_round(price: Money) -> Money {
    let cents = price.cents();
    if cents < 100 {
        return price;
    }
    let whole = (cents + 50) / 100;
    Money::from_cents(whole * 100 - 1)
}
