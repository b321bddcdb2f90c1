use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::RowError;
use crate::fair_odds::round2;
use crate::history::{HistoricalDataset, HistoricalMatch};

pub const MAX_SELECTED_TEAMS: usize = 2;
const RECENT_LIMIT: usize = 10;

/// Team and date-range selection. An empty team list keeps every team; date
/// bounds are inclusive and rows without a date fall outside any bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverviewFilter {
    teams: Vec<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl OverviewFilter {
    pub fn new(
        teams: Vec<String>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Self, RowError> {
        if teams.len() > MAX_SELECTED_TEAMS {
            return Err(RowError::InvalidInput(format!(
                "at most {MAX_SELECTED_TEAMS} teams can be selected (got {})",
                teams.len()
            )));
        }
        if let (Some(from), Some(to)) = (from, to)
            && from > to
        {
            return Err(RowError::InvalidInput(format!(
                "date range starts after it ends ({from} > {to})"
            )));
        }
        Ok(Self { teams, from, to })
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn matches(&self, m: &HistoricalMatch) -> bool {
        let team_ok = self.teams.is_empty()
            || self.teams.iter().any(|t| *t == m.home || *t == m.away);
        if !team_ok {
            return false;
        }
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some(date) = m.match_date else {
            return false;
        };
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultSplit {
    pub home_wins: usize,
    pub draws: usize,
    pub away_wins: usize,
}

/// Venue averages for one team; `None` where the team has no such rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamVenueStats {
    pub team: String,
    pub home_games: usize,
    pub home_avg_total_goals: Option<f64>,
    pub home_avg_corners: Option<f64>,
    pub away_games: usize,
    pub away_avg_total_goals: Option<f64>,
    pub away_avg_corners: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetOverview {
    pub matches: usize,
    /// Rows with a final score; goal figures are computed over these only.
    pub played: usize,
    pub avg_goals: Option<f64>,
    pub over25: usize,
    pub over25_pct: Option<f64>,
    pub btts: usize,
    pub btts_pct: Option<f64>,
    pub avg_corners: Option<f64>,
    pub results: ResultSplit,
    pub teams: Vec<TeamVenueStats>,
    pub recent: Vec<HistoricalMatch>,
}

/// Summary of the rows the filter keeps, or `None` when it keeps nothing.
pub fn overview(dataset: &HistoricalDataset, filter: &OverviewFilter) -> Option<DatasetOverview> {
    let rows = dataset
        .matches()
        .iter()
        .filter(|m| filter.matches(m))
        .collect::<Vec<_>>();
    if rows.is_empty() {
        return None;
    }

    let scores = rows.iter().filter_map(|m| m.score()).collect::<Vec<_>>();
    let played = scores.len();
    let over25 = scores.iter().filter(|(h, a)| f64::from(h + a) > 2.5).count();
    let btts = scores.iter().filter(|(h, a)| *h > 0 && *a > 0).count();
    let mut results = ResultSplit::default();
    for (h, a) in &scores {
        match h.cmp(a) {
            std::cmp::Ordering::Greater => results.home_wins += 1,
            std::cmp::Ordering::Equal => results.draws += 1,
            std::cmp::Ordering::Less => results.away_wins += 1,
        }
    }

    let pct = |count: usize| (played > 0).then(|| round2(count as f64 / played as f64 * 100.0));

    let mut recent = rows.iter().map(|m| (*m).clone()).collect::<Vec<_>>();
    recent.sort_by(|a, b| b.match_date.cmp(&a.match_date));
    recent.truncate(RECENT_LIMIT);

    Some(DatasetOverview {
        matches: rows.len(),
        played,
        avg_goals: mean(scores.iter().map(|(h, a)| f64::from(h + a))),
        over25,
        over25_pct: pct(over25),
        btts,
        btts_pct: pct(btts),
        avg_corners: mean(rows.iter().filter_map(|m| m.total_corners()).map(f64::from)),
        results,
        teams: venue_stats(&rows, filter.teams()),
        recent,
    })
}

fn venue_stats(rows: &[&HistoricalMatch], selected: &[String]) -> Vec<TeamVenueStats> {
    let names: BTreeSet<&str> = if selected.is_empty() {
        rows.iter()
            .flat_map(|m| [m.home.as_str(), m.away.as_str()])
            .collect()
    } else {
        selected.iter().map(String::as_str).collect()
    };

    names
        .into_iter()
        .map(|team| {
            let home = rows.iter().filter(|m| m.home == team).collect::<Vec<_>>();
            let away = rows.iter().filter(|m| m.away == team).collect::<Vec<_>>();
            TeamVenueStats {
                team: team.to_string(),
                home_games: home.len(),
                home_avg_total_goals: mean(home.iter().filter_map(|m| m.total_goals()).map(f64::from)),
                home_avg_corners: mean(home.iter().filter_map(|m| m.corners_home).map(f64::from)),
                away_games: away.len(),
                away_avg_total_goals: mean(away.iter().filter_map(|m| m.total_goals()).map(f64::from)),
                away_avg_corners: mean(away.iter().filter_map(|m| m.corners_away).map(f64::from)),
            }
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| round2(sum / n as f64))
}
