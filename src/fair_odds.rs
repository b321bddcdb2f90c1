use std::fmt;

use serde::{Serialize, Serializer};

pub const UNDEFINED_MARKER: &str = "n/a";

/// Decimal odds implied by a model probability. A zero-probability outcome has
/// no representable price, so it stays `Undefined` instead of becoming
/// infinity or zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FairOdds {
    Quoted(f64),
    Undefined,
}

impl FairOdds {
    pub fn value(self) -> Option<f64> {
        match self {
            FairOdds::Quoted(v) => Some(v),
            FairOdds::Undefined => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, FairOdds::Quoted(_))
    }
}

impl fmt::Display for FairOdds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FairOdds::Quoted(v) => write!(f, "{v:.2}"),
            FairOdds::Undefined => f.write_str(UNDEFINED_MARKER),
        }
    }
}

impl Serialize for FairOdds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FairOdds::Quoted(v) => serializer.serialize_some(v),
            FairOdds::Undefined => serializer.serialize_none(),
        }
    }
}

pub fn fair_odds(prob: f64) -> FairOdds {
    if prob > 0.0 && prob.is_finite() {
        FairOdds::Quoted(round2(1.0 / prob))
    } else {
        FairOdds::Undefined
    }
}

pub fn implied_probability(decimal_odds: f64) -> Option<f64> {
    if decimal_odds > 0.0 && decimal_odds.is_finite() {
        Some(1.0 / decimal_odds)
    } else {
        None
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Probability as a percentage with two decimals, as shown in reports.
pub fn percent(prob: f64) -> f64 {
    round2(prob * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverts_probability() {
        assert_eq!(fair_odds(0.5), FairOdds::Quoted(2.0));
        assert_eq!(fair_odds(1.0), FairOdds::Quoted(1.0));
        assert_eq!(fair_odds(0.3), FairOdds::Quoted(3.33));
    }

    #[test]
    fn product_with_probability_is_close_to_one() {
        for step in 1..=100 {
            let p = step as f64 / 100.0;
            let odds = fair_odds(p).value().unwrap();
            // two-decimal rounding bounds the error by 0.005 * p
            assert!((odds * p - 1.0).abs() <= 0.005 * p + 1e-12);
        }
    }

    #[test]
    fn zero_probability_is_undefined() {
        let odds = fair_odds(0.0);
        assert_eq!(odds, FairOdds::Undefined);
        assert_eq!(odds.value(), None);
        assert_eq!(odds.to_string(), "n/a");
        assert!(!odds.is_defined());
    }

    #[test]
    fn displays_two_decimals() {
        assert_eq!(fair_odds(0.4).to_string(), "2.50");
    }

    #[test]
    fn serializes_undefined_as_null() {
        assert_eq!(serde_json::to_string(&FairOdds::Undefined).unwrap(), "null");
        assert_eq!(serde_json::to_string(&fair_odds(0.25)).unwrap(), "4.0");
    }

    #[test]
    fn implied_probability_rejects_non_positive() {
        assert_eq!(implied_probability(2.0), Some(0.5));
        assert_eq!(implied_probability(0.0), None);
        assert_eq!(implied_probability(-1.5), None);
    }

    #[test]
    fn percent_rounds_to_two_places() {
        assert_eq!(percent(0.123456), 12.35);
        assert_eq!(percent(1.0), 100.0);
    }
}
