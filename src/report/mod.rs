//! Report and export formatting.
//!
//! Pure presentation mapping: summaries and projections in, flat rounded rows
//! out. Nothing in here aggregates usage on its own except the overview
//! rollups, which only regroup already-aggregated daily summaries.

mod estimate;
mod export;
mod import;
mod overview;

pub use estimate::*;
pub use export::*;
pub use import::*;
pub use overview::*;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

/// Default price of one credit in USD
pub const DEFAULT_CREDIT_PRICE: f64 = 3.00;

/// Decimal places for currency columns
pub const CURRENCY_PLACES: u32 = 2;

/// Decimal places for credit and ratio columns
pub const CREDIT_PLACES: u32 = 4;

/// Errors from report generation and CSV handling
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Invalid credit price {0}: must be a positive number")]
    InvalidCreditPrice(f64),

    #[error("CSV missing required columns: {0}")]
    MissingColumns(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Credit-to-currency conversion rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CreditPrice(f64);

impl CreditPrice {
    pub fn new(price: f64) -> Result<Self, ReportError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(ReportError::InvalidCreditPrice(price));
        }
        Ok(Self(price))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Convert credits to currency (unrounded)
    pub fn cost_of(&self, credits: f64) -> f64 {
        credits * self.0
    }
}

impl Default for CreditPrice {
    fn default() -> Self {
        Self(DEFAULT_CREDIT_PRICE)
    }
}

/// Round half away from zero to `places` decimals.
///
/// Rounds the shortest decimal that reads back as `value` (what `Display`
/// prints), so `2.675` becomes `2.68` while `2.674999999` stays `2.67`.
/// Values outside `Decimal`'s range are returned unchanged.
pub fn round_half_up(value: f64, places: u32) -> f64 {
    let Ok(decimal) = value.to_string().parse::<Decimal>() else {
        return value;
    };
    decimal
        .round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
        .to_string()
        .parse()
        .unwrap_or(value)
}

pub fn round_currency(value: f64) -> f64 {
    round_half_up(value, CURRENCY_PLACES)
}

pub fn round_credits(value: f64) -> f64 {
    round_half_up(value, CREDIT_PLACES)
}

/// Format a currency amount as `$1,234.56`
pub fn format_currency(value: f64) -> String {
    let rounded = round_currency(value);
    let sign = if rounded < 0.0 { "-" } else { "" };
    let cents = (rounded.abs() * 100.0).round() as u64;
    format!("{}${}.{:02}", sign, group_thousands(cents / 100), cents % 100)
}

/// Format a count as `1,234` (rounded to the nearest whole number)
pub fn format_number(value: f64) -> String {
    let rounded = round_half_up(value, 0);
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{}{}", sign, group_thousands(rounded.abs() as u64))
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_price_validation() {
        assert!(CreditPrice::new(0.0).is_err());
        assert!(CreditPrice::new(-1.0).is_err());
        assert!(CreditPrice::new(f64::NAN).is_err());
        assert_eq!(CreditPrice::new(2.5).unwrap().cost_of(4.0), 10.0);
        assert_eq!(CreditPrice::default().value(), 3.0);
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_currency(2.675), 2.68);
        assert_eq!(round_currency(1.005), 1.01);
        assert_eq!(round_currency(1.004), 1.0);
        assert_eq!(round_credits(0.12345), 0.1235);
        assert_eq!(round_credits(0.12344), 0.1234);
        assert_eq!(round_credits(5.0), 5.0);
        assert_eq!(round_currency(-1.005), -1.01);
        assert!(round_currency(f64::NAN).is_nan());
        assert_eq!(round_currency(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn test_round_just_below_midpoint() {
        assert_eq!(round_currency(2.674999999), 2.67);
        assert_eq!(round_credits(0.12344999995), 0.1234);
        assert_eq!(round_currency(0.004999), 0.0);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_currency(1234567.891), "$1,234,567.89");
        assert_eq!(format_currency(0.5), "$0.50");
        assert_eq!(format_currency(-12.0), "-$12.00");
        assert_eq!(format_number(999.5), "1,000");
        assert_eq!(format_number(12.0), "12");
    }
}
