//! Independent-Poisson scoreline model.
//!
//! Every 1X2 figure here is computed over a finite `0..=max_goals` grid per
//! side. The mass beyond the grid is dropped, not redistributed, so the three
//! outcome probabilities sum to slightly less than one and converge upward as
//! `max_goals` grows. Over/under and BTTS have closed forms and are exact.

use serde::Serialize;

use crate::error::{RowError, Side};
use crate::market::Market;

pub const REFERENCE_LINE: f64 = 2.5;
pub const GOAL_LINES: [f64; 4] = [0.5, 1.5, 2.5, 3.5];

/// `lambda^k * e^-lambda / k!`. A negative or non-finite rate is rejected
/// before anything is computed.
pub fn poisson_pmf(lambda: f64, k: u32) -> Result<f64, RowError> {
    if !lambda.is_finite() || lambda < 0.0 {
        return Err(RowError::InvalidInput(format!(
            "poisson rate must be a non-negative number (got {lambda})"
        )));
    }
    Ok(pmf_unchecked(lambda, k))
}

/// Built up term by term so large `k` never touches a factorial.
fn pmf_unchecked(lambda: f64, k: u32) -> f64 {
    let mut p = (-lambda).exp();
    for i in 1..=k {
        p *= lambda / i as f64;
    }
    p
}

fn pmf_series(lambda: f64, max_k: u32) -> Vec<f64> {
    let mut out = Vec::with_capacity(max_k as usize + 1);
    out.push((-lambda).exp());
    for k in 1..=max_k as usize {
        out.push(out[k - 1] * lambda / k as f64);
    }
    out
}

pub fn validate_rate(lambda: f64, side: Side) -> Result<f64, RowError> {
    if !lambda.is_finite() || lambda < 0.0 {
        return Err(RowError::InvalidInput(format!(
            "expected goals for the {side} must be a non-negative number (got {lambda})"
        )));
    }
    Ok(lambda)
}

/// Parses a grid size coming from text or configuration. Negative values are a
/// caller error, not something to clamp.
pub fn validate_max_goals(raw: i64) -> Result<u32, RowError> {
    u32::try_from(raw).map_err(|_| {
        RowError::InvalidInput(format!("max_goals must be a non-negative integer (got {raw})"))
    })
}

/// (home win, draw, away win) summed over the truncated grid.
pub fn match_outcome_probabilities(
    lambda_home: f64,
    lambda_away: f64,
    max_goals: u32,
) -> Result<(f64, f64, f64), RowError> {
    let grid = ScorelineGrid::new(lambda_home, lambda_away, max_goals)?;
    Ok(grid.outcome_probs())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverUnder {
    pub line: f64,
    pub over: f64,
    pub under: f64,
}

/// P(total goals > threshold) via its complement, P(total <= floor(threshold)).
/// The sum of two independent Poissons is Poisson(lh + la), so the complement
/// is that distribution's CDF and no scoreline grid is involved.
pub fn over_under_probability(
    lambda_home: f64,
    lambda_away: f64,
    threshold: f64,
) -> Result<OverUnder, RowError> {
    let lambda_home = validate_rate(lambda_home, Side::Home)?;
    let lambda_away = validate_rate(lambda_away, Side::Away)?;
    if !threshold.is_finite() {
        return Err(RowError::InvalidInput(format!(
            "goal line must be finite (got {threshold})"
        )));
    }
    Ok(over_under_unchecked(lambda_home, lambda_away, threshold))
}

fn over_under_unchecked(lambda_home: f64, lambda_away: f64, threshold: f64) -> OverUnder {
    let floor = threshold.floor();
    if floor < 0.0 {
        return OverUnder {
            line: threshold,
            over: 1.0,
            under: 0.0,
        };
    }
    let total = lambda_home + lambda_away;
    let mut term = (-total).exp();
    let mut under = term;
    let mut k = 1.0;
    while k <= floor {
        term *= total / k;
        under += term;
        // Past the mode the terms only shrink; stop once they no longer move the sum.
        if k > total && term <= under * f64::EPSILON {
            break;
        }
        k += 1.0;
    }
    let under = under.min(1.0);
    OverUnder {
        line: threshold,
        over: 1.0 - under,
        under,
    }
}

/// BTTS via "at least one side blanks":
/// `1 - (P(h=0) + P(a=0) - P(h=0) * P(a=0))`.
pub fn both_teams_score_probability(lambda_home: f64, lambda_away: f64) -> Result<f64, RowError> {
    let lambda_home = validate_rate(lambda_home, Side::Home)?;
    let lambda_away = validate_rate(lambda_away, Side::Away)?;
    let h0 = pmf_unchecked(lambda_home, 0);
    let a0 = pmf_unchecked(lambda_away, 0);
    Ok(1.0 - (h0 + a0 - h0 * a0))
}

/// Same quantity as [`both_teams_score_probability`], written as
/// `(1 - P(h=0)) * (1 - P(a=0))`.
pub fn both_teams_score_product(lambda_home: f64, lambda_away: f64) -> Result<f64, RowError> {
    let lambda_home = validate_rate(lambda_home, Side::Home)?;
    let lambda_away = validate_rate(lambda_away, Side::Away)?;
    Ok((1.0 - pmf_unchecked(lambda_home, 0)) * (1.0 - pmf_unchecked(lambda_away, 0)))
}

/// Joint scoreline probabilities for `0..=max_goals` goals per side.
#[derive(Debug, Clone)]
pub struct ScorelineGrid {
    max_goals: u32,
    // row-major, home goals are the row
    cells: Vec<f64>,
}

impl ScorelineGrid {
    pub fn new(lambda_home: f64, lambda_away: f64, max_goals: u32) -> Result<Self, RowError> {
        let lambda_home = validate_rate(lambda_home, Side::Home)?;
        let lambda_away = validate_rate(lambda_away, Side::Away)?;

        let pmf_h = pmf_series(lambda_home, max_goals);
        let pmf_a = pmf_series(lambda_away, max_goals);
        let mut cells = Vec::with_capacity(pmf_h.len() * pmf_a.len());
        for p_i in &pmf_h {
            for p_j in &pmf_a {
                cells.push(p_i * p_j);
            }
        }
        Ok(Self { max_goals, cells })
    }

    pub fn max_goals(&self) -> u32 {
        self.max_goals
    }

    pub fn prob(&self, home_goals: u32, away_goals: u32) -> f64 {
        if home_goals > self.max_goals || away_goals > self.max_goals {
            return 0.0;
        }
        let width = self.max_goals as usize + 1;
        self.cells[home_goals as usize * width + away_goals as usize]
    }

    pub fn outcome_probs(&self) -> (f64, f64, f64) {
        let mut p_home = 0.0;
        let mut p_draw = 0.0;
        let mut p_away = 0.0;
        for (i, j, p) in self.iter() {
            if i > j {
                p_home += p;
            } else if i < j {
                p_away += p;
            } else {
                p_draw += p;
            }
        }
        (p_home, p_draw, p_away)
    }

    /// Total probability captured by the grid; `1 - mass()` is the truncation error.
    pub fn mass(&self) -> f64 {
        self.cells.iter().sum()
    }

    pub fn most_likely(&self) -> (u32, u32, f64) {
        let mut best = (0, 0, f64::MIN);
        for (i, j, p) in self.iter() {
            if p > best.2 {
                best = (i, j, p);
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, f64)> + '_ {
        let width = self.max_goals as usize + 1;
        self.cells
            .iter()
            .enumerate()
            .map(move |(idx, p)| ((idx / width) as u32, (idx % width) as u32, *p))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeDistribution {
    pub lambda_home: f64,
    pub lambda_away: f64,
    pub max_goals: u32,
    pub p_home_win: f64,
    pub p_draw: f64,
    pub p_away_win: f64,
    pub goal_lines: Vec<OverUnder>,
    pub p_btts_yes: f64,
    pub p_btts_no: f64,
    pub most_likely_score: (u32, u32),
}

impl OutcomeDistribution {
    pub fn from_rates(lambda_home: f64, lambda_away: f64, max_goals: u32) -> Result<Self, RowError> {
        let grid = ScorelineGrid::new(lambda_home, lambda_away, max_goals)?;
        let (p_home_win, p_draw, p_away_win) = grid.outcome_probs();
        let (h, a, _) = grid.most_likely();

        let goal_lines = GOAL_LINES
            .iter()
            .map(|line| over_under_unchecked(lambda_home, lambda_away, *line))
            .collect();
        let p_btts_yes = both_teams_score_probability(lambda_home, lambda_away)?;

        Ok(Self {
            lambda_home,
            lambda_away,
            max_goals,
            p_home_win,
            p_draw,
            p_away_win,
            goal_lines,
            p_btts_yes,
            p_btts_no: 1.0 - p_btts_yes,
            most_likely_score: (h, a),
        })
    }

    pub fn over_under(&self, line: f64) -> OverUnder {
        self.goal_lines
            .iter()
            .find(|ou| (ou.line - line).abs() < 1e-9)
            .copied()
            .unwrap_or_else(|| over_under_unchecked(self.lambda_home, self.lambda_away, line))
    }

    pub fn p_over(&self, line: f64) -> f64 {
        self.over_under(line).over
    }

    pub fn p_under(&self, line: f64) -> f64 {
        self.over_under(line).under
    }

    pub fn expected_total_goals(&self) -> f64 {
        self.lambda_home + self.lambda_away
    }

    pub fn favourite(&self) -> Favourite {
        if self.lambda_home > self.lambda_away {
            Favourite::Home
        } else if self.lambda_home < self.lambda_away {
            Favourite::Away
        } else {
            Favourite::Level
        }
    }

    /// Model probability behind each market. With level rates the home side
    /// stands in as favourite and the away side as underdog.
    pub fn probability(&self, market: Market) -> f64 {
        match market {
            Market::HomeWin => self.p_home_win,
            Market::Draw => self.p_draw,
            Market::AwayWin => self.p_away_win,
            Market::Over25 => self.p_over(REFERENCE_LINE),
            Market::Under25 => self.p_under(REFERENCE_LINE),
            Market::BttsYes => self.p_btts_yes,
            Market::BttsNo => self.p_btts_no,
            Market::BackFavourite => match self.favourite() {
                Favourite::Away => self.p_away_win,
                Favourite::Home | Favourite::Level => self.p_home_win,
            },
            Market::LayUnderdog => match self.favourite() {
                Favourite::Away => self.p_home_win,
                Favourite::Home | Favourite::Level => self.p_away_win,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Favourite {
    Home,
    Away,
    /// Equal rates; no side is favoured.
    Level,
}
