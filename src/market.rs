use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RowError;
use crate::fair_odds::{FairOdds, fair_odds, implied_probability, percent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    HomeWin,
    Draw,
    AwayWin,
    Over25,
    Under25,
    BttsYes,
    BttsNo,
    BackFavourite,
    LayUnderdog,
}

impl Market {
    pub const BATCH: [Market; 7] = [
        Market::HomeWin,
        Market::Draw,
        Market::AwayWin,
        Market::Over25,
        Market::Under25,
        Market::BttsYes,
        Market::BttsNo,
    ];

    pub const SINGLE: [Market; 4] = [
        Market::Over25,
        Market::BackFavourite,
        Market::LayUnderdog,
        Market::BttsYes,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Market::HomeWin => "Home Win",
            Market::Draw => "Draw",
            Market::AwayWin => "Away Win",
            Market::Over25 => "Over 2.5",
            Market::Under25 => "Under 2.5",
            Market::BttsYes => "BTTS Yes",
            Market::BttsNo => "BTTS No",
            Market::BackFavourite => "Back Favourite",
            Market::LayUnderdog => "Lay Underdog",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Quoted market price as it arrives from free text or a nullable column.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MarketOdds {
    Valid(f64),
    #[default]
    Missing,
    Malformed(String),
}

impl MarketOdds {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return MarketOdds::Missing;
        }
        let normalized = s.replace(',', ".");
        match normalized.parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => MarketOdds::Valid(v),
            _ => MarketOdds::Malformed(raw.to_string()),
        }
    }

    pub fn from_value(v: f64) -> Self {
        if v.is_finite() && v > 0.0 {
            MarketOdds::Valid(v)
        } else {
            MarketOdds::Malformed(v.to_string())
        }
    }

    pub fn from_option(v: Option<f64>) -> Self {
        v.map_or(MarketOdds::Missing, MarketOdds::from_value)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MarketOdds::Valid(v) => Some(*v),
            _ => None,
        }
    }

    /// Explanation for odds that were supplied but cannot be used.
    pub fn issue(&self, market: Market) -> Option<RowError> {
        match self {
            MarketOdds::Malformed(raw) => Some(RowError::InvalidOdds {
                market,
                raw: raw.clone(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for MarketOdds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketOdds::Valid(v) => write!(f, "{v:.2}"),
            MarketOdds::Missing => f.write_str("-"),
            MarketOdds::Malformed(raw) => write!(f, "'{raw}'"),
        }
    }
}

impl Serialize for MarketOdds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MarketOdds::Valid(v) => serializer.serialize_f64(*v),
            MarketOdds::Missing => serializer.serialize_none(),
            MarketOdds::Malformed(raw) => serializer.serialize_str(raw),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOdds {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for MarketOdds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<RawOdds>::deserialize(deserializer)? {
            None => MarketOdds::Missing,
            Some(RawOdds::Number(v)) => MarketOdds::from_value(v),
            Some(RawOdds::Text(s)) => MarketOdds::parse(&s),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueVerdict {
    Favorable,
    Unfavorable,
    Incomparable,
}

/// Rendering-neutral classification attached to each compared market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueTag {
    Value,
    NoValue,
    #[serde(rename = "n/a")]
    NotAvailable,
}

impl ValueTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueTag::Value => "value",
            ValueTag::NoValue => "no-value",
            ValueTag::NotAvailable => "n/a",
        }
    }
}

impl ValueVerdict {
    pub fn tag(self) -> ValueTag {
        match self {
            ValueVerdict::Favorable => ValueTag::Value,
            ValueVerdict::Unfavorable => ValueTag::NoValue,
            ValueVerdict::Incomparable => ValueTag::NotAvailable,
        }
    }

    pub fn is_favorable(self) -> bool {
        self == ValueVerdict::Favorable
    }
}

/// Strict comparison: equal prices carry zero edge and count as unfavorable.
pub fn detect_value(market: &MarketOdds, fair: FairOdds) -> ValueVerdict {
    let (MarketOdds::Valid(quoted), FairOdds::Quoted(fair)) = (market, fair) else {
        return ValueVerdict::Incomparable;
    };
    if *quoted > fair {
        ValueVerdict::Favorable
    } else {
        ValueVerdict::Unfavorable
    }
}

/// Expected return per unit staked if the model probability is right.
pub fn edge(market: &MarketOdds, prob: f64) -> Option<f64> {
    let implied = implied_probability(market.value()?)?;
    if prob <= 0.0 {
        return None;
    }
    Some(prob / implied - 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketLine {
    pub market: Market,
    pub market_odds: MarketOdds,
    pub probability: f64,
    pub probability_pct: f64,
    pub fair_odds: FairOdds,
    pub verdict: ValueVerdict,
    pub tag: ValueTag,
    /// Probability the quoted price stands for, `1 / odds`.
    pub implied_probability: Option<f64>,
    pub edge: Option<f64>,
}

impl MarketLine {
    pub fn evaluate(market: Market, probability: f64, market_odds: MarketOdds) -> Self {
        let fair = fair_odds(probability);
        let verdict = detect_value(&market_odds, fair);
        let expected = if verdict == ValueVerdict::Incomparable {
            None
        } else {
            edge(&market_odds, probability)
        };
        Self {
            market,
            probability,
            probability_pct: percent(probability),
            fair_odds: fair,
            verdict,
            tag: verdict.tag(),
            implied_probability: market_odds.value().and_then(implied_probability),
            edge: expected,
            market_odds,
        }
    }

    pub fn issue(&self) -> Option<RowError> {
        self.market_odds.issue(self.market)
    }

    /// One-line human explanation for the verdict.
    pub fn explain(&self) -> String {
        match self.verdict {
            ValueVerdict::Favorable => format!(
                "{} may have value (positive expected value){}",
                self.market,
                self.price_gap()
            ),
            ValueVerdict::Unfavorable => {
                format!("{} may not have value{}", self.market, self.price_gap())
            }
            ValueVerdict::Incomparable => {
                if let Some(err) = self.issue() {
                    err.to_string()
                } else if !self.fair_odds.is_defined() {
                    format!("{}: fair odds cannot be computed, comparison skipped", self.market)
                } else {
                    format!("{}: no market odds supplied", self.market)
                }
            }
        }
    }

    fn price_gap(&self) -> String {
        match self.implied_probability {
            Some(implied) => format!(
                ": market implies {:.2}%, model {:.2}%",
                percent(implied),
                self.probability_pct
            ),
            None => String::new(),
        }
    }
}
