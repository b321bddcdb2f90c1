use serde::Serialize;

use crate::batch::MatchReport;
use crate::market::Market;
use crate::poisson::REFERENCE_LINE;

pub const DEFAULT_MIN_OVER_PROBABILITY: f64 = 0.60;

/// Selection rule for value candidates.
///
/// Draw value does not count by default: only the moneyline sides do. The
/// flag exists so that choice can be changed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OpportunityPolicy {
    pub include_draw: bool,
    pub over_line: f64,
    pub min_over_probability: f64,
}

impl Default for OpportunityPolicy {
    fn default() -> Self {
        Self {
            include_draw: false,
            over_line: REFERENCE_LINE,
            min_over_probability: DEFAULT_MIN_OVER_PROBABILITY,
        }
    }
}

impl OpportunityPolicy {
    pub fn is_opportunity(&self, row: &MatchReport) -> bool {
        let favorable = |market: Market| row.verdict(market).is_favorable();
        let moneyline = favorable(Market::HomeWin)
            || favorable(Market::AwayWin)
            || (self.include_draw && favorable(Market::Draw));
        moneyline && row.distribution.p_over(self.over_line) > self.min_over_probability
    }
}

/// Filters the rows the policy selects and orders them by descending home-win
/// probability. The sort is stable, so equal probabilities keep input order.
pub fn rank_opportunities(rows: &[MatchReport], policy: &OpportunityPolicy) -> Vec<MatchReport> {
    let mut selected = rows
        .iter()
        .filter(|row| policy.is_opportunity(row))
        .cloned()
        .collect::<Vec<_>>();
    selected.sort_by(|a, b| {
        b.distribution
            .p_home_win
            .partial_cmp(&a.distribution.p_home_win)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    selected
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpportunitySummary {
    pub selected: usize,
    pub total: usize,
}

impl OpportunitySummary {
    pub fn ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| self.selected as f64 / self.total as f64)
    }
}
