use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DatasetError, RowError};
use crate::team_index::TeamIndex;

const CACHE_DIR: &str = "fairodds";
const DB_FILE: &str = "league_matches.sqlite";

/// Full-time prices quoted for a fixture, as stored alongside the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureOdds {
    pub home: Option<f64>,
    pub draw: Option<f64>,
    pub away: Option<f64>,
    pub over25: Option<f64>,
    pub under25: Option<f64>,
    pub btts_yes: Option<f64>,
    pub btts_no: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalMatch {
    pub league: String,
    pub season: Option<String>,
    pub match_date: Option<NaiveDate>,
    pub home: String,
    pub away: String,
    pub goals_home: Option<i32>,
    pub goals_away: Option<i32>,
    pub corners_home: Option<i32>,
    pub corners_away: Option<i32>,
    #[serde(default)]
    pub odds: FixtureOdds,
}

impl HistoricalMatch {
    pub fn score(&self) -> Option<(i32, i32)> {
        Some((self.goals_home?, self.goals_away?))
    }

    pub fn total_goals(&self) -> Option<i32> {
        self.score().map(|(h, a)| h + a)
    }

    pub fn total_corners(&self) -> Option<i32> {
        Some(self.corners_home? + self.corners_away?)
    }

    pub fn label(&self) -> String {
        format!("{} x {}", self.home, self.away)
    }
}

/// Per-team scoring sums split by venue.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TeamRecord {
    pub home_games: u32,
    pub home_scored: u32,
    pub home_conceded: u32,
    pub away_games: u32,
    pub away_scored: u32,
    pub away_conceded: u32,
}

impl TeamRecord {
    pub fn home_avg_scored(&self) -> Option<f64> {
        mean(self.home_scored, self.home_games)
    }

    pub fn home_avg_conceded(&self) -> Option<f64> {
        mean(self.home_conceded, self.home_games)
    }

    pub fn away_avg_scored(&self) -> Option<f64> {
        mean(self.away_scored, self.away_games)
    }

    pub fn away_avg_conceded(&self) -> Option<f64> {
        mean(self.away_conceded, self.away_games)
    }
}

fn mean(sum: u32, n: u32) -> Option<f64> {
    (n > 0).then(|| sum as f64 / n as f64)
}

/// Expected-goals rates for one fixture plus the averages they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectedGoals {
    pub home_team: String,
    pub away_team: String,
    pub home_avg_scored: f64,
    pub home_avg_conceded: f64,
    pub away_avg_scored: f64,
    pub away_avg_conceded: f64,
    pub lambda_home: f64,
    pub lambda_away: f64,
}

impl ExpectedGoals {
    pub fn total(&self) -> f64 {
        self.lambda_home + self.lambda_away
    }
}

/// Read-only snapshot of the historical table. Everything derived from it
/// (team index, rates) is rebuilt from a new snapshot on reload.
#[derive(Debug, Clone)]
pub struct HistoricalDataset {
    matches: Vec<HistoricalMatch>,
    records: HashMap<String, TeamRecord>,
}

impl HistoricalDataset {
    pub fn new(matches: Vec<HistoricalMatch>) -> Result<Self, DatasetError> {
        if matches.is_empty() {
            return Err(DatasetError::Empty);
        }
        let records = team_records(&matches);
        Ok(Self { matches, records })
    }

    pub fn matches(&self) -> &[HistoricalMatch] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Home names first, then away names, in row order.
    pub fn team_index(&self) -> TeamIndex {
        TeamIndex::new(
            self.matches
                .iter()
                .map(|m| m.home.as_str())
                .chain(self.matches.iter().map(|m| m.away.as_str())),
        )
    }

    pub fn record(&self, team: &str) -> Option<&TeamRecord> {
        self.records.get(team)
    }

    /// Home rate is the home side's mean goals scored at home; away rate is
    /// the away side's mean goals scored away. Unfinished rows are ignored.
    pub fn expected_goals(&self, home: &str, away: &str) -> Result<ExpectedGoals, RowError> {
        let insufficient = |team: &str| RowError::InsufficientHistory {
            team: team.to_string(),
        };
        let home_rec = self.records.get(home).ok_or_else(|| insufficient(home))?;
        let away_rec = self.records.get(away).ok_or_else(|| insufficient(away))?;

        let (Some(home_avg_scored), Some(home_avg_conceded)) =
            (home_rec.home_avg_scored(), home_rec.home_avg_conceded())
        else {
            return Err(insufficient(home));
        };
        let (Some(away_avg_scored), Some(away_avg_conceded)) =
            (away_rec.away_avg_scored(), away_rec.away_avg_conceded())
        else {
            return Err(insufficient(away));
        };

        Ok(ExpectedGoals {
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_avg_scored,
            home_avg_conceded,
            away_avg_scored,
            away_avg_conceded,
            lambda_home: home_avg_scored,
            lambda_away: away_avg_scored,
        })
    }
}

fn team_records(matches: &[HistoricalMatch]) -> HashMap<String, TeamRecord> {
    let mut out: HashMap<String, TeamRecord> = HashMap::new();
    for m in matches {
        let Some((h, a)) = m.score() else {
            continue;
        };
        let (h, a) = (h.max(0) as u32, a.max(0) as u32);

        let home = out.entry(m.home.clone()).or_default();
        home.home_games += 1;
        home.home_scored += h;
        home.home_conceded += a;

        let away = out.entry(m.away.clone()).or_default();
        away.away_games += 1;
        away.away_scored += a;
        away.away_conceded += h;
    }
    out
}

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR).join(DB_FILE));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR).join(DB_FILE))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS league_matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            league TEXT NOT NULL,
            season TEXT NULL,
            match_date TEXT NULL,
            home TEXT NOT NULL,
            away TEXT NOT NULL,
            goals_h_ft INTEGER NULL,
            goals_a_ft INTEGER NULL,
            corners_h_ft INTEGER NULL,
            corners_a_ft INTEGER NULL,
            odd_h_ft REAL NULL,
            odd_d_ft REAL NULL,
            odd_a_ft REAL NULL,
            odd_over25_ft REAL NULL,
            odd_under25_ft REAL NULL,
            odd_btts_yes REAL NULL,
            odd_btts_no REAL NULL
        );
        CREATE INDEX IF NOT EXISTS idx_league_matches_home ON league_matches(home);
        CREATE INDEX IF NOT EXISTS idx_league_matches_away ON league_matches(away);
        CREATE INDEX IF NOT EXISTS idx_league_matches_date ON league_matches(match_date);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn insert_match(conn: &Connection, m: &HistoricalMatch) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO league_matches (
            league, season, match_date, home, away,
            goals_h_ft, goals_a_ft, corners_h_ft, corners_a_ft,
            odd_h_ft, odd_d_ft, odd_a_ft,
            odd_over25_ft, odd_under25_ft, odd_btts_yes, odd_btts_no
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9,
            ?10, ?11, ?12,
            ?13, ?14, ?15, ?16
        )
        "#,
        params![
            m.league,
            m.season,
            m.match_date.map(|d| d.format("%Y-%m-%d").to_string()),
            m.home,
            m.away,
            m.goals_home,
            m.goals_away,
            m.corners_home,
            m.corners_away,
            m.odds.home,
            m.odds.draw,
            m.odds.away,
            m.odds.over25,
            m.odds.under25,
            m.odds.btts_yes,
            m.odds.btts_no,
        ],
    )
    .context("insert league match")?;
    Ok(())
}

pub fn load_matches(conn: &Connection) -> Result<Vec<HistoricalMatch>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                league, season, match_date, home, away,
                goals_h_ft, goals_a_ft, corners_h_ft, corners_a_ft,
                odd_h_ft, odd_d_ft, odd_a_ft,
                odd_over25_ft, odd_under25_ft, odd_btts_yes, odd_btts_no
            FROM league_matches
            WHERE TRIM(home) <> '' AND TRIM(away) <> ''
            ORDER BY match_date ASC, id ASC
            "#,
        )
        .context("prepare load league matches query")?;

    let rows = stmt
        .query_map([], |row| {
            let raw_date: Option<String> = row.get(2)?;
            Ok(HistoricalMatch {
                league: row.get(0)?,
                season: row.get(1)?,
                match_date: raw_date.as_deref().and_then(parse_match_date),
                home: row.get::<_, String>(3)?.trim().to_string(),
                away: row.get::<_, String>(4)?.trim().to_string(),
                goals_home: row.get(5)?,
                goals_away: row.get(6)?,
                corners_home: row.get(7)?,
                corners_away: row.get(8)?,
                odds: FixtureOdds {
                    home: row.get(9)?,
                    draw: row.get(10)?,
                    away: row.get(11)?,
                    over25: row.get(12)?,
                    under25: row.get(13)?,
                    btts_yes: row.get(14)?,
                    btts_no: row.get(15)?,
                },
            })
        })
        .context("query league matches")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode league match row")?);
    }
    Ok(out)
}

/// Loads the whole table as a snapshot. An empty table halts processing with a
/// single top-level error.
pub fn load_dataset(conn: &Connection) -> Result<HistoricalDataset> {
    let matches = load_matches(conn)?;
    let dataset = HistoricalDataset::new(matches)?;
    info!(
        rows = dataset.len(),
        teams = dataset.records.len(),
        "historical dataset loaded"
    );
    Ok(dataset)
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
pub fn parse_match_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
