use serde::Serialize;
use tracing::info;

use crate::error::{RowError, Side};
use crate::history::{ExpectedGoals, HistoricalDataset};
use crate::market::{Market, MarketLine, MarketOdds};
use crate::poisson::{Favourite, OutcomeDistribution};
use crate::team_index::{ResolvedPair, TeamIndex, resolve_pair};

/// Raw form input for one match. Odds stay as typed text until evaluated.
#[derive(Debug, Clone, Default)]
pub struct PredictionRequest {
    pub home: String,
    pub away: String,
    pub over25: String,
    pub back_favourite: String,
    pub lay_underdog: String,
    pub btts: String,
}

impl PredictionRequest {
    pub fn new(home: &str, away: &str) -> Self {
        Self {
            home: home.to_string(),
            away: away.to_string(),
            ..Self::default()
        }
    }

    fn odds_text(&self, market: Market) -> &str {
        match market {
            Market::Over25 => &self.over25,
            Market::BackFavourite => &self.back_favourite,
            Market::LayUnderdog => &self.lay_underdog,
            Market::BttsYes => &self.btts,
            _ => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchPrediction {
    pub teams: ResolvedPair,
    pub expected: ExpectedGoals,
    pub distribution: OutcomeDistribution,
    pub favourite: Favourite,
    pub favourite_team: String,
    pub underdog_team: String,
    /// Over 2.5, Back Favourite, Lay Underdog, BTTS.
    pub lines: Vec<MarketLine>,
    /// Home win, draw, away win; no odds attached.
    pub outcome_lines: Vec<MarketLine>,
}

impl MatchPrediction {
    /// "Did you mean" notices for names taken from a single suggestion.
    pub fn notices(&self) -> Vec<String> {
        [(&self.teams.home, Side::Home), (&self.teams.away, Side::Away)]
            .into_iter()
            .filter(|(team, _)| team.suggested)
            .map(|(team, side)| {
                format!(
                    "{side} '{}' not found, using suggestion '{}'",
                    team.query, team.name
                )
            })
            .collect()
    }

    pub fn line(&self, market: Market) -> Option<&MarketLine> {
        self.lines.iter().find(|l| l.market == market)
    }
}

pub fn predict_match(
    dataset: &HistoricalDataset,
    index: &TeamIndex,
    req: &PredictionRequest,
    cutoff: f64,
    max_goals: u32,
) -> Result<MatchPrediction, RowError> {
    let teams = resolve_pair(&req.home, &req.away, index, cutoff)?;
    for team in [&teams.home, &teams.away] {
        if team.suggested {
            info!(query = %team.query, name = %team.name, "team name resolved by suggestion");
        }
    }

    let expected = dataset.expected_goals(&teams.home.name, &teams.away.name)?;
    let distribution =
        OutcomeDistribution::from_rates(expected.lambda_home, expected.lambda_away, max_goals)?;

    let favourite = distribution.favourite();
    let (favourite_team, underdog_team) = match favourite {
        Favourite::Away => (teams.away.name.clone(), teams.home.name.clone()),
        Favourite::Home | Favourite::Level => (teams.home.name.clone(), teams.away.name.clone()),
    };

    let lines = Market::SINGLE
        .iter()
        .map(|m| {
            MarketLine::evaluate(
                *m,
                distribution.probability(*m),
                MarketOdds::parse(req.odds_text(*m)),
            )
        })
        .collect();
    let outcome_lines = [Market::HomeWin, Market::Draw, Market::AwayWin]
        .into_iter()
        .map(|m| MarketLine::evaluate(m, distribution.probability(m), MarketOdds::Missing))
        .collect();

    Ok(MatchPrediction {
        teams,
        expected,
        distribution,
        favourite,
        favourite_team,
        underdog_team,
        lines,
        outcome_lines,
    })
}
