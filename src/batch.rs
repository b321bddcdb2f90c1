use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{RowError, Side};
use crate::history::{ExpectedGoals, HistoricalDataset, HistoricalMatch};
use crate::market::{Market, MarketLine, MarketOdds, ValueVerdict};
use crate::poisson::{OutcomeDistribution, validate_rate};
use crate::ranker::{OpportunityPolicy, OpportunitySummary, rank_opportunities};
use crate::team_index::{TeamIndex, resolve_team};

/// One fixture with its expected-goals rates already known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchInput {
    pub home_team: String,
    pub away_team: String,
    pub lambda_home: f64,
    pub lambda_away: f64,
    #[serde(default)]
    pub odds: BTreeMap<Market, MarketOdds>,
}

impl MatchInput {
    pub fn new(home: &str, away: &str, lambda_home: f64, lambda_away: f64) -> Self {
        Self {
            home_team: home.to_string(),
            away_team: away.to_string(),
            lambda_home,
            lambda_away,
            odds: BTreeMap::new(),
        }
    }

    pub fn odds_for(&self, market: Market) -> MarketOdds {
        self.odds.get(&market).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    pub label: String,
    pub home: String,
    pub away: String,
    pub expected: Option<ExpectedGoals>,
    pub distribution: OutcomeDistribution,
    pub lines: Vec<MarketLine>,
}

impl MatchReport {
    pub fn line(&self, market: Market) -> Option<&MarketLine> {
        self.lines.iter().find(|l| l.market == market)
    }

    pub fn verdict(&self, market: Market) -> ValueVerdict {
        self.line(market)
            .map_or(ValueVerdict::Incomparable, |l| l.verdict)
    }
}

pub fn evaluate_input(input: &MatchInput, max_goals: u32) -> Result<MatchReport, RowError> {
    evaluate_markets(input, max_goals, &Market::BATCH)
}

pub fn evaluate_markets(
    input: &MatchInput,
    max_goals: u32,
    markets: &[Market],
) -> Result<MatchReport, RowError> {
    if input.home_team.trim().is_empty() {
        return Err(RowError::missing(format!("{} name", Side::Home)));
    }
    if input.away_team.trim().is_empty() {
        return Err(RowError::missing(format!("{} name", Side::Away)));
    }
    let distribution =
        OutcomeDistribution::from_rates(input.lambda_home, input.lambda_away, max_goals)?;
    let lines = markets
        .iter()
        .map(|m| MarketLine::evaluate(*m, distribution.probability(*m), input.odds_for(*m)))
        .collect();

    Ok(MatchReport {
        label: format!("{} x {}", input.home_team, input.away_team),
        home: input.home_team.clone(),
        away: input.away_team.clone(),
        expected: None,
        distribution,
        lines,
    })
}

/// A batch row as it arrives: names, optional explicit rates, optional odds.
/// Rows without rates take them from the historical snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureRequest {
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub away: String,
    #[serde(default)]
    pub lambda_home: Option<f64>,
    #[serde(default)]
    pub lambda_away: Option<f64>,
    #[serde(default)]
    pub odds: BTreeMap<Market, MarketOdds>,
}

impl FixtureRequest {
    pub fn from_match(m: &HistoricalMatch) -> Self {
        let odds = [
            (Market::HomeWin, m.odds.home),
            (Market::Draw, m.odds.draw),
            (Market::AwayWin, m.odds.away),
            (Market::Over25, m.odds.over25),
            (Market::Under25, m.odds.under25),
            (Market::BttsYes, m.odds.btts_yes),
            (Market::BttsNo, m.odds.btts_no),
        ]
        .into_iter()
        .map(|(market, price)| (market, MarketOdds::from_option(price)))
        .collect();
        Self {
            home: m.home.clone(),
            away: m.away.clone(),
            lambda_home: None,
            lambda_away: None,
            odds,
        }
    }

    pub fn label(&self) -> String {
        format!("{} x {}", self.home.trim(), self.away.trim())
    }
}

/// One element of a fixtures file. An element that does not decode is kept in
/// place so the rest of the file is still evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum FixtureRow {
    Parsed(FixtureRequest),
    Rejected { label: String, error: RowError },
}

impl FixtureRow {
    pub fn label(&self) -> String {
        match self {
            FixtureRow::Parsed(req) => req.label(),
            FixtureRow::Rejected { label, .. } => label.clone(),
        }
    }
}

pub fn load_requests(path: &Path) -> Result<Vec<FixtureRow>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read fixtures file {}", path.display()))?;
    parse_requests(&raw)
}

/// The file must be a JSON array; each element is decoded on its own.
pub fn parse_requests(raw: &str) -> Result<Vec<FixtureRow>> {
    let values = serde_json::from_str::<Vec<Value>>(raw.trim())
        .context("invalid fixtures json: expected an array of fixtures")?;
    Ok(values
        .into_iter()
        .enumerate()
        .map(|(position, value)| decode_row(position, value))
        .collect())
}

fn decode_row(position: usize, value: Value) -> FixtureRow {
    let label = raw_label(position, &value);
    if let Some(key) = unknown_market_key(&value) {
        return FixtureRow::Rejected {
            label,
            error: RowError::InvalidInput(format!("unknown market '{key}' in odds")),
        };
    }
    match serde_json::from_value::<FixtureRequest>(value) {
        Ok(req) => FixtureRow::Parsed(req),
        Err(err) => FixtureRow::Rejected {
            label,
            error: RowError::InvalidInput(format!("fixture {}: {err}", position + 1)),
        },
    }
}

fn raw_label(position: usize, value: &Value) -> String {
    let name = |key: &str| value.get(key).and_then(Value::as_str).map(str::trim);
    match (name("home"), name("away")) {
        (Some(home), Some(away)) => format!("{home} x {away}"),
        _ => format!("fixture {}", position + 1),
    }
}

fn unknown_market_key(value: &Value) -> Option<String> {
    value
        .get("odds")?
        .as_object()?
        .keys()
        .find(|key| serde_json::from_value::<Market>(Value::String((*key).clone())).is_err())
        .cloned()
}

#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub max_goals: u32,
    pub cutoff: f64,
    pub policy: OpportunityPolicy,
    pub parallelism: usize,
}

impl From<&EngineConfig> for BatchSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            max_goals: cfg.max_goals_batch,
            cutoff: cfg.resolve_cutoff,
            policy: cfg.policy,
            parallelism: cfg.parallelism,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub position: usize,
    pub label: String,
    pub result: Result<MatchReport, RowError>,
}

impl Serialize for RowOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("RowOutcome", 4)?;
        st.serialize_field("position", &self.position)?;
        st.serialize_field("label", &self.label)?;
        match &self.result {
            Ok(report) => {
                st.serialize_field("report", report)?;
                st.serialize_field("error", &None::<String>)?;
            }
            Err(err) => {
                st.serialize_field("report", &None::<MatchReport>)?;
                st.serialize_field("error", &Some(err.to_string()))?;
            }
        }
        st.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub rows: Vec<RowOutcome>,
    pub opportunities: Vec<MatchReport>,
    /// `selected` opportunities out of every row in the batch, failed rows included.
    pub summary: OpportunitySummary,
}

impl BatchReport {
    pub fn reports(&self) -> impl Iterator<Item = &MatchReport> {
        self.rows.iter().filter_map(|r| r.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&RowOutcome, &RowError)> {
        self.rows
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (r, e)))
    }
}

/// Evaluates every row independently (in parallel), keeps input order, then
/// ranks. A bad row only fails itself.
pub fn run_batch(
    requests: &[FixtureRequest],
    dataset: Option<&HistoricalDataset>,
    settings: &BatchSettings,
) -> BatchReport {
    let rows = requests
        .iter()
        .cloned()
        .map(FixtureRow::Parsed)
        .collect::<Vec<_>>();
    run_batch_rows(&rows, dataset, settings)
}

/// Same as [`run_batch`] over decoded file rows; rejected rows become failed
/// outcomes at their position.
pub fn run_batch_rows(
    requests: &[FixtureRow],
    dataset: Option<&HistoricalDataset>,
    settings: &BatchSettings,
) -> BatchReport {
    let index = dataset.map(HistoricalDataset::team_index).unwrap_or_default();
    let pool = build_pool(settings.parallelism);

    let rows = with_pool(&pool, || {
        requests
            .par_iter()
            .enumerate()
            .map(|(position, row)| RowOutcome {
                position,
                label: row.label(),
                result: match row {
                    FixtureRow::Parsed(req) => evaluate_request(req, dataset, &index, settings),
                    FixtureRow::Rejected { error, .. } => Err(error.clone()),
                },
            })
            .collect::<Vec<_>>()
    });

    for row in &rows {
        if let Err(err) = &row.result {
            warn!(row = row.position, label = %row.label, "batch row skipped: {err}");
        }
    }

    let reports = rows
        .iter()
        .filter_map(|r| r.result.as_ref().ok().cloned())
        .collect::<Vec<_>>();
    let opportunities = rank_opportunities(&reports, &settings.policy);
    let summary = OpportunitySummary {
        selected: opportunities.len(),
        total: rows.len(),
    };
    info!(
        rows = rows.len(),
        evaluated = reports.len(),
        opportunities = summary.selected,
        "batch evaluated"
    );

    BatchReport {
        rows,
        opportunities,
        summary,
    }
}

fn evaluate_request(
    req: &FixtureRequest,
    dataset: Option<&HistoricalDataset>,
    index: &TeamIndex,
    settings: &BatchSettings,
) -> Result<MatchReport, RowError> {
    let (input, expected) = build_input(req, dataset, index, settings.cutoff)?;
    let mut report = evaluate_input(&input, settings.max_goals)?;
    report.expected = expected;
    Ok(report)
}

fn build_input(
    req: &FixtureRequest,
    dataset: Option<&HistoricalDataset>,
    index: &TeamIndex,
    cutoff: f64,
) -> Result<(MatchInput, Option<ExpectedGoals>), RowError> {
    if req.home.trim().is_empty() {
        return Err(RowError::missing(format!("{} name", Side::Home)));
    }
    if req.away.trim().is_empty() {
        return Err(RowError::missing(format!("{} name", Side::Away)));
    }

    match (req.lambda_home, req.lambda_away) {
        (Some(lh), Some(la)) => {
            let mut input = MatchInput::new(
                req.home.trim(),
                req.away.trim(),
                validate_rate(lh, Side::Home)?,
                validate_rate(la, Side::Away)?,
            );
            input.odds = req.odds.clone();
            Ok((input, None))
        }
        (Some(_), None) => Err(RowError::missing("lambda_away")),
        (None, Some(_)) => Err(RowError::missing("lambda_home")),
        (None, None) => {
            let Some(dataset) = dataset else {
                return Err(RowError::missing("expected-goals rates"));
            };
            let home = resolve_team(&req.home, Side::Home, index, cutoff)?;
            let away = resolve_team(&req.away, Side::Away, index, cutoff)?;
            let expected = dataset.expected_goals(&home.name, &away.name)?;
            let mut input = MatchInput::new(
                &home.name,
                &away.name,
                expected.lambda_home,
                expected.lambda_away,
            );
            input.odds = req.odds.clone();
            Ok((input, Some(expected)))
        }
    }
}

fn build_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .ok()
}

fn with_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::tests::played;

    fn settings() -> BatchSettings {
        BatchSettings {
            max_goals: 5,
            cutoff: 0.4,
            policy: OpportunityPolicy::default(),
            parallelism: 2,
        }
    }

    fn dataset() -> HistoricalDataset {
        HistoricalDataset::new(vec![
            played("Alpha", "Beta", 3, 1),
            played("Alpha", "Gamma", 2, 2),
            played("Beta", "Alpha", 1, 2),
            played("Gamma", "Alpha", 0, 1),
            played("Beta", "Gamma", 2, 0),
        ])
        .unwrap()
    }

    #[test]
    fn evaluates_all_batch_markets() {
        let report = evaluate_input(&MatchInput::new("H", "A", 1.4, 1.0), 5).unwrap();
        assert_eq!(report.label, "H x A");
        assert_eq!(report.lines.len(), Market::BATCH.len());
        assert!(report.lines.iter().all(|l| l.verdict == ValueVerdict::Incomparable));
        assert_eq!(report.distribution.max_goals, 5);
    }

    #[test]
    fn zero_rates_leave_btts_incomparable() {
        let mut input = MatchInput::new("H", "A", 0.0, 0.0);
        input.odds.insert(Market::BttsYes, MarketOdds::Valid(3.0));
        let report = evaluate_input(&input, 5).unwrap();
        let line = report.line(Market::BttsYes).unwrap();
        assert_eq!(line.probability, 0.0);
        assert!(!line.fair_odds.is_defined());
        assert_eq!(line.verdict, ValueVerdict::Incomparable);
    }

    #[test]
    fn rates_come_from_history_when_absent() {
        let ds = dataset();
        let req = FixtureRequest {
            home: "alpha".to_string(),
            away: "Gama".to_string(),
            ..FixtureRequest::default()
        };
        let report = run_batch(&[req], Some(&ds), &settings());
        let row = report.rows[0].result.as_ref().unwrap();
        assert_eq!(row.home, "Alpha");
        assert_eq!(row.away, "Gamma");
        let xg = row.expected.as_ref().unwrap();
        assert_eq!(xg.lambda_home, 2.5);
        assert_eq!(xg.lambda_away, 1.0);
    }

    #[test]
    fn bad_rows_do_not_stop_the_batch() {
        let ds = dataset();
        let requests = vec![
            FixtureRequest {
                home: "Alpha".to_string(),
                away: "Beta".to_string(),
                ..FixtureRequest::default()
            },
            FixtureRequest {
                home: String::new(),
                away: "Beta".to_string(),
                ..FixtureRequest::default()
            },
            FixtureRequest {
                home: "Alpha".to_string(),
                away: "Beta".to_string(),
                lambda_home: Some(-1.0),
                lambda_away: Some(1.0),
                ..FixtureRequest::default()
            },
            FixtureRequest {
                home: "Zzzzzz".to_string(),
                away: "Beta".to_string(),
                ..FixtureRequest::default()
            },
        ];
        let report = run_batch(&requests, Some(&ds), &settings());
        assert_eq!(report.rows.len(), 4);
        assert!(report.rows[0].result.is_ok());
        assert_eq!(
            report.rows[1].result,
            Err(RowError::missing("home team name"))
        );
        assert!(matches!(report.rows[2].result, Err(RowError::InvalidInput(_))));
        assert!(matches!(
            report.rows[3].result,
            Err(RowError::UnresolvedTeam { .. })
        ));
        assert_eq!(report.reports().count(), 1);
        assert_eq!(report.failures().count(), 3);
        assert_eq!(report.summary.total, 4);
    }

    #[test]
    fn rows_keep_input_order() {
        let requests = (0..20)
            .map(|i| FixtureRequest {
                home: format!("H{i}"),
                away: format!("A{i}"),
                lambda_home: Some(1.0 + i as f64 * 0.05),
                lambda_away: Some(1.0),
                ..FixtureRequest::default()
            })
            .collect::<Vec<_>>();
        let report = run_batch(&requests, None, &settings());
        for (i, row) in report.rows.iter().enumerate() {
            assert_eq!(row.position, i);
            assert_eq!(row.label, format!("H{i} x A{i}"));
        }
    }

    #[test]
    fn history_rows_without_dataset_need_rates() {
        let req = FixtureRequest {
            home: "Alpha".to_string(),
            away: "Beta".to_string(),
            lambda_home: Some(1.2),
            ..FixtureRequest::default()
        };
        let report = run_batch(&[req.clone()], None, &settings());
        assert_eq!(report.rows[0].result, Err(RowError::missing("lambda_away")));

        let req = FixtureRequest {
            lambda_home: None,
            ..req
        };
        let report = run_batch(&[req], None, &settings());
        assert_eq!(
            report.rows[0].result,
            Err(RowError::missing("expected-goals rates"))
        );
    }

    #[test]
    fn stored_odds_become_market_odds() {
        let mut m = played("Alpha", "Beta", 1, 0);
        m.odds.home = Some(1.8);
        m.odds.btts_no = Some(0.0);
        let req = FixtureRequest::from_match(&m);
        assert_eq!(req.odds[&Market::HomeWin], MarketOdds::Valid(1.8));
        assert_eq!(req.odds[&Market::Draw], MarketOdds::Missing);
        assert!(matches!(req.odds[&Market::BttsNo], MarketOdds::Malformed(_)));
    }

    #[test]
    fn parses_fixture_json() {
        let raw = r#"[
            {"home": "Alpha", "away": "Beta", "odds": {"home_win": 2.1, "over25": "1,75", "draw": ""}},
            {"home": "X", "away": "Y", "lambda_home": 1.2, "lambda_away": 0.8}
        ]"#;
        let rows = parse_requests(raw).unwrap();
        assert_eq!(rows.len(), 2);
        let FixtureRow::Parsed(first) = &rows[0] else {
            panic!("first row should decode: {:?}", rows[0]);
        };
        assert_eq!(first.odds[&Market::HomeWin], MarketOdds::Valid(2.1));
        assert_eq!(first.odds[&Market::Over25], MarketOdds::Valid(1.75));
        assert_eq!(first.odds[&Market::Draw], MarketOdds::Missing);
        let FixtureRow::Parsed(second) = &rows[1] else {
            panic!("second row should decode: {:?}", rows[1]);
        };
        assert_eq!(second.lambda_home, Some(1.2));
    }

    #[test]
    fn mistyped_fixture_only_fails_its_own_row() {
        let raw = r#"[
            {"home": "H1", "away": "A1", "lambda_home": 1.4, "lambda_away": 1.0},
            {"home": "H2", "away": "A2", "lambda_home": "abc", "lambda_away": 1.0},
            {"home": "H3", "away": "A3", "lambda_home": 0.9, "lambda_away": 1.3}
        ]"#;
        let rows = parse_requests(raw).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(matches!(
            &rows[1],
            FixtureRow::Rejected { label, error: RowError::InvalidInput(_) } if label == "H2 x A2"
        ));

        let report = run_batch_rows(&rows, None, &settings());
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.reports().count(), 2);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.rows[1].position, 1);
        assert_eq!(report.rows[1].label, "H2 x A2");
        assert!(report.rows[2].result.is_ok());
        assert_eq!(report.summary.total, 3);
    }

    #[test]
    fn unknown_market_key_fails_its_row() {
        let raw = r#"[
            {"odds": {"correct_score": 7.5}, "lambda_home": 1.0, "lambda_away": 1.0},
            {"home": "H", "away": "A", "lambda_home": 1.0, "lambda_away": 1.0}
        ]"#;
        let rows = parse_requests(raw).unwrap();
        match &rows[0] {
            FixtureRow::Rejected { label, error } => {
                assert_eq!(label, "fixture 1");
                assert!(error.to_string().contains("correct_score"));
            }
            other => panic!("expected a rejected row, got {other:?}"),
        }
        assert!(matches!(rows[1], FixtureRow::Parsed(_)));
    }

    #[test]
    fn fixtures_file_must_be_an_array() {
        assert!(parse_requests(r#"{"home": "H"}"#).is_err());
        assert!(parse_requests("not json").is_err());
    }

    #[test]
    fn row_outcome_serializes_error_text() {
        let row = RowOutcome {
            position: 3,
            label: "A x B".to_string(),
            result: Err(RowError::missing("home team name")),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["position"], 3);
        assert_eq!(json["error"], "missing input: home team name");
        assert!(json["report"].is_null());
    }
}
