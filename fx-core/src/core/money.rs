//! Fixed-point money types and the precision/rounding rules of spec §6.
//!
//! All prices and amounts are `rust_decimal::Decimal`. Quantity precision is
//! 0 decimal places for JPY-denominated base currencies, 2 otherwise; price
//! precision is 3 when either leg of a pair is JPY, 5 otherwise. Rounding is
//! always half-even (banker's rounding) to avoid systematically favoring
//! either counterparty.

use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::str::FromStr;

/// A currency pair in "BASE/QUOTE" form (spec GLOSSARY).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    pub fn as_str(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    pub fn involves_jpy(&self) -> bool {
        self.base.eq_ignore_ascii_case("JPY") || self.quote.eq_ignore_ascii_case("JPY")
    }

    /// Number of decimal places quantities (base-currency units) are rounded to.
    pub fn quantity_precision(&self) -> u32 {
        if self.base.eq_ignore_ascii_case("JPY") {
            0
        } else {
            2
        }
    }

    /// Number of decimal places prices (quote per base) are rounded to.
    pub fn price_precision(&self) -> u32 {
        if self.involves_jpy() {
            3
        } else {
            5
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CurrencyPair {
    type Err = CurrencyPairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let base = parts.next().filter(|s| !s.is_empty());
        let quote = parts.next().filter(|s| !s.is_empty());
        match (base, quote, parts.next()) {
            (Some(b), Some(q), None) => Ok(CurrencyPair::new(b, q)),
            _ => Err(CurrencyPairParseError(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid currency pair {0:?}: expected \"BASE/QUOTE\"")]
pub struct CurrencyPairParseError(String);

impl TryFrom<String> for CurrencyPair {
    type Error = CurrencyPairParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyPair> for String {
    fn from(pair: CurrencyPair) -> Self {
        pair.as_str()
    }
}

/// Round `value` to `places` decimal places using half-even rounding.
pub fn round_half_even(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven)
}

pub fn round_quantity(pair: &CurrencyPair, quantity: Decimal) -> Decimal {
    round_half_even(quantity, pair.quantity_precision())
}

pub fn round_price(pair: &CurrencyPair, price: Decimal) -> Decimal {
    round_half_even(price, pair.price_precision())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_base_quote() {
        let pair: CurrencyPair = "EUR/USD".parse().unwrap();
        assert_eq!(pair.base, "EUR");
        assert_eq!(pair.quote, "USD");
    }

    #[test]
    fn rejects_missing_slash() {
        assert!("EURUSD".parse::<CurrencyPair>().is_err());
    }

    #[test]
    fn jpy_pairs_use_tighter_precision() {
        let pair = CurrencyPair::new("USD", "JPY");
        assert_eq!(pair.price_precision(), 3);
        assert_eq!(pair.quantity_precision(), 2);

        let jpy_base = CurrencyPair::new("JPY", "USD");
        assert_eq!(jpy_base.quantity_precision(), 0);
    }

    #[test]
    fn half_even_rounds_to_nearest_even_on_tie() {
        assert_eq!(round_half_even(dec!(1.00005), 4), dec!(1.0000));
        assert_eq!(round_half_even(dec!(1.00015), 4), dec!(1.0002));
    }
}
