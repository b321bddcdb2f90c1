use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use fairodds::batch::{self, BatchReport, BatchSettings, FixtureRequest, FixtureRow};
use fairodds::config::{EngineConfig, clamp_cutoff, parse_max_goals};
use fairodds::export;
use fairodds::history::{self, HistoricalDataset};
use fairodds::logging;
use fairodds::overview::{self, DatasetOverview, OverviewFilter};
use fairodds::predictor::{self, MatchPrediction, PredictionRequest};
use fairodds::team_index::{ResolveResult, resolve};

const USAGE: &str = "\
usage: fairodds <command> [options]

commands:
  predict  --home <name> --away <name> [--over25 x] [--back x] [--lay x] [--btts x]
  scan     [--fixtures file.json] [--xlsx out.xlsx]
  overview [--team a] [--team b] [--from YYYY-MM-DD] [--to YYYY-MM-DD]

options:
  --db <path>          sqlite snapshot (default: $FAIRODDS_DB or the cache dir)
  --max-goals <n>      grid size for this run
  --cutoff <x>         name-resolution similarity cutoff
  --include-draw       count draw value when ranking a scan
  --json               print the result as JSON";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let args = Args::from_env();
    logging::init(args.flag("--json"));

    let Some(command) = args.command() else {
        eprintln!("{USAGE}");
        return Ok(());
    };
    let cfg = apply_overrides(EngineConfig::from_env()?, &args)?;

    match command {
        "predict" => cmd_predict(&args, &cfg),
        "scan" => cmd_scan(&args, &cfg),
        "overview" => cmd_overview(&args, &cfg),
        "help" | "--help" | "-h" => {
            println!("{USAGE}");
            Ok(())
        }
        other => Err(anyhow!("unknown command '{other}'\n\n{USAGE}")),
    }
}

fn apply_overrides(mut cfg: EngineConfig, args: &Args) -> Result<EngineConfig> {
    if let Some(path) = args.value("--db") {
        cfg.db_path = Some(PathBuf::from(path));
    }
    if let Some(raw) = args.value("--max-goals") {
        let n = parse_max_goals("--max-goals", raw)?;
        cfg.max_goals_batch = n;
        cfg.max_goals_single = n;
    }
    if let Some(raw) = args.value("--cutoff") {
        let cutoff = raw
            .parse::<f64>()
            .with_context(|| format!("--cutoff must be a number (got '{raw}')"))?;
        cfg.resolve_cutoff = clamp_cutoff(cutoff);
    }
    if args.flag("--include-draw") {
        cfg.policy.include_draw = true;
    }
    Ok(cfg)
}

fn load_dataset(cfg: &EngineConfig) -> Result<HistoricalDataset> {
    let path = cfg
        .db_path
        .clone()
        .context("unable to resolve sqlite path")?;
    let conn = history::open_db(&path)?;
    history::load_dataset(&conn).with_context(|| format!("load dataset from {}", path.display()))
}

fn cmd_predict(args: &Args, cfg: &EngineConfig) -> Result<()> {
    let dataset = load_dataset(cfg)?;
    let index = dataset.team_index();
    let req = PredictionRequest {
        home: args.value("--home").unwrap_or_default().to_string(),
        away: args.value("--away").unwrap_or_default().to_string(),
        over25: args.value("--over25").unwrap_or_default().to_string(),
        back_favourite: args.value("--back").unwrap_or_default().to_string(),
        lay_underdog: args.value("--lay").unwrap_or_default().to_string(),
        btts: args.value("--btts").unwrap_or_default().to_string(),
    };

    let prediction = predictor::predict_match(
        &dataset,
        &index,
        &req,
        cfg.resolve_cutoff,
        cfg.max_goals_single,
    )?;

    if args.flag("--json") {
        return print_json(&prediction);
    }
    print_prediction(&prediction);
    Ok(())
}

fn print_prediction(p: &MatchPrediction) {
    for notice in p.notices() {
        println!("note: {notice}");
    }
    println!("{} x {}", p.teams.home.name, p.teams.away.name);
    println!(
        "  {:<14} scored {:.2} conceded {:.2} (home)",
        p.expected.home_team, p.expected.home_avg_scored, p.expected.home_avg_conceded
    );
    println!(
        "  {:<14} scored {:.2} conceded {:.2} (away)",
        p.expected.away_team, p.expected.away_avg_scored, p.expected.away_avg_conceded
    );
    println!("  total expected goals {:.2}", p.expected.total());
    println!(
        "  favourite {} / underdog {}",
        p.favourite_team, p.underdog_team
    );
    println!();
    for line in p.outcome_lines.iter().chain(p.lines.iter()) {
        println!(
            "  {:<15} {:>6.2}%  fair {:>6}  market {:>6}  {}",
            line.market.label(),
            line.probability_pct,
            line.fair_odds,
            line.market_odds,
            line.tag.as_str()
        );
    }
    println!();
    for line in &p.lines {
        println!("  {}", line.explain());
    }
}

fn cmd_scan(args: &Args, cfg: &EngineConfig) -> Result<()> {
    let settings = BatchSettings::from(cfg);
    let (requests, dataset) = match args.value("--fixtures") {
        Some(path) => {
            let requests = batch::load_requests(&PathBuf::from(path))?;
            let dataset = match load_dataset(cfg) {
                Ok(ds) => Some(ds),
                Err(err) => {
                    warn!("no historical snapshot, rows need explicit rates: {err:#}");
                    None
                }
            };
            (requests, dataset)
        }
        None => {
            let dataset = load_dataset(cfg)?;
            (snapshot_fixtures(&dataset), Some(dataset))
        }
    };

    let report = batch::run_batch_rows(&requests, dataset.as_ref(), &settings);

    if let Some(out) = args.value("--xlsx") {
        let path = PathBuf::from(out);
        let written = export::export_batch(&report, &path)?;
        info!(
            rows = written.rows,
            failed = written.failed,
            opportunities = written.opportunities,
            path = %path.display(),
            "workbook written"
        );
    }

    if args.flag("--json") {
        return print_json(&report);
    }
    print_scan(&report);
    Ok(())
}

/// Fixtures still waiting for a result; a fully played snapshot is scanned whole.
fn snapshot_fixtures(dataset: &HistoricalDataset) -> Vec<FixtureRow> {
    let upcoming = dataset
        .matches()
        .iter()
        .filter(|m| m.score().is_none())
        .map(|m| FixtureRow::Parsed(FixtureRequest::from_match(m)))
        .collect::<Vec<_>>();
    if !upcoming.is_empty() {
        return upcoming;
    }
    info!("no unplayed fixtures in snapshot, scanning every row");
    dataset
        .matches()
        .iter()
        .map(|m| FixtureRow::Parsed(FixtureRequest::from_match(m)))
        .collect()
}

fn print_scan(report: &BatchReport) {
    for row in &report.rows {
        match &row.result {
            Ok(r) => println!(
                "{:>4}  {:<36} H {:>5.1}%  D {:>5.1}%  A {:>5.1}%  O2.5 {:>5.1}%",
                row.position + 1,
                row.label,
                r.distribution.p_home_win * 100.0,
                r.distribution.p_draw * 100.0,
                r.distribution.p_away_win * 100.0,
                r.distribution.p_over(fairodds::poisson::REFERENCE_LINE) * 100.0,
            ),
            Err(err) => println!("{:>4}  {:<36} error: {err}", row.position + 1, row.label),
        }
    }
    println!();
    println!(
        "opportunities: {}/{}",
        report.summary.selected, report.summary.total
    );
    for (rank, r) in report.opportunities.iter().enumerate() {
        let value_on = r
            .lines
            .iter()
            .filter(|l| l.verdict.is_favorable())
            .map(|l| l.market.label())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:>4}. {:<36} home win {:>5.1}%  value: {value_on}",
            rank + 1,
            r.label,
            r.distribution.p_home_win * 100.0
        );
    }
}

fn cmd_overview(args: &Args, cfg: &EngineConfig) -> Result<()> {
    let dataset = load_dataset(cfg)?;
    let index = dataset.team_index();

    let mut teams = Vec::new();
    for query in args.values("--team") {
        match resolve(query, &index, cfg.resolve_cutoff) {
            ResolveResult::Exact(name) => teams.push(name),
            ResolveResult::SingleSuggestion(name) => {
                info!(query, name = %name, "team name resolved by suggestion");
                teams.push(name);
            }
            ResolveResult::MultipleSuggestions(names) => {
                bail!("team '{query}' is ambiguous, did you mean: {}?", names.join(", "))
            }
            ResolveResult::NoMatch => bail!("team '{query}' not found"),
        }
    }
    let from = args.value("--from").map(parse_date).transpose()?;
    let to = args.value("--to").map(parse_date).transpose()?;
    let filter = OverviewFilter::new(teams, from, to)?;

    let summary = overview::overview(&dataset, &filter);
    if args.flag("--json") {
        return print_json(&summary);
    }
    match summary {
        Some(o) => print_overview(&o),
        None => println!("no data for the selected criteria"),
    }
    Ok(())
}

fn print_overview(o: &DatasetOverview) {
    let num = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"));
    println!("matches        {} ({} played)", o.matches, o.played);
    println!("goals/match    {}", num(o.avg_goals));
    println!("over 2.5       {} ({}%)", o.over25, num(o.over25_pct));
    println!("btts           {} ({}%)", o.btts, num(o.btts_pct));
    println!("corners/match  {}", num(o.avg_corners));
    println!(
        "results        home {} / draw {} / away {}",
        o.results.home_wins, o.results.draws, o.results.away_wins
    );
    println!();
    for t in &o.teams {
        println!(
            "{:<24} home {:>3} gp goals {:>5} corners {:>5} | away {:>3} gp goals {:>5} corners {:>5}",
            t.team,
            t.home_games,
            num(t.home_avg_total_goals),
            num(t.home_avg_corners),
            t.away_games,
            num(t.away_avg_total_goals),
            num(t.away_avg_corners),
        );
    }
    if !o.recent.is_empty() {
        println!();
        for m in &o.recent {
            let date = m
                .match_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "----------".to_string());
            let score = m
                .score()
                .map(|(h, a)| format!("{h}-{a}"))
                .unwrap_or_else(|| "-".to_string());
            println!("{date}  {:<40} {score}", m.label());
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `--key value` / `--key=value` lookup over the process arguments.
struct Args {
    raw: Vec<String>,
}

impl Args {
    fn from_env() -> Self {
        Self {
            raw: std::env::args().skip(1).collect(),
        }
    }

    fn command(&self) -> Option<&str> {
        self.raw.first().map(String::as_str)
    }

    fn flag(&self, name: &str) -> bool {
        self.raw.iter().any(|arg| arg == name)
    }

    fn value(&self, name: &str) -> Option<&str> {
        self.values(name).into_iter().next()
    }

    fn values(&self, name: &str) -> Vec<&str> {
        let prefix = format!("{name}=");
        let mut out = Vec::new();
        for (idx, arg) in self.raw.iter().enumerate() {
            if let Some(v) = arg.strip_prefix(&prefix) {
                if !v.trim().is_empty() {
                    out.push(v);
                }
            } else if arg == name
                && let Some(next) = self.raw.get(idx + 1)
                && !next.starts_with("--")
            {
                out.push(next.as_str());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairodds::error::RowError;
    use fairodds::history::{FixtureOdds, HistoricalMatch, insert_match, open_db};

    fn args(raw: &[&str]) -> Args {
        Args {
            raw: raw.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn seeded_config(name: &str) -> EngineConfig {
        let path = std::env::temp_dir().join(format!("fairodds-{name}-{}.sqlite", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let conn = open_db(&path).unwrap();
        for (home, away, gh, ga) in [("Alpha", "Beta", 2, 1), ("Beta", "Alpha", 0, 1)] {
            insert_match(
                &conn,
                &HistoricalMatch {
                    league: "Test".to_string(),
                    season: None,
                    match_date: None,
                    home: home.to_string(),
                    away: away.to_string(),
                    goals_home: Some(gh),
                    goals_away: Some(ga),
                    corners_home: None,
                    corners_away: None,
                    odds: FixtureOdds::default(),
                },
            )
            .unwrap();
        }
        EngineConfig {
            db_path: Some(path),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn predict_failure_is_returned_to_main() {
        let cfg = seeded_config("predict-unresolved");
        let err = cmd_predict(&args(&["predict", "--home", "Zzzzzz", "--away", "Beta"]), &cfg)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RowError>(),
            Some(RowError::UnresolvedTeam { .. })
        ));
        assert!(cmd_predict(&args(&["predict", "--home", "Alpha", "--away", "Beta"]), &cfg).is_ok());
        if let Some(path) = &cfg.db_path {
            let _ = std::fs::remove_file(path);
        }
    }

    #[test]
    fn option_values_accept_both_spellings() {
        let a = args(&["overview", "--team", "Alpha", "--team=Beta", "--json"]);
        assert_eq!(a.command(), Some("overview"));
        assert_eq!(a.values("--team"), vec!["Alpha", "Beta"]);
        assert!(a.flag("--json"));
        assert_eq!(a.value("--from"), None);
    }
}
